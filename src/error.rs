// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Colloquy
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::protocol::StructuralError;

/// Main error type for Colloquy operations
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transmission view failed protocol validation
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// The tool execution machinery itself failed (not the tool)
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// History store write failure
    #[error("History store error: {0}")]
    Store(String),

    /// Another cycle is already in flight for this conversation
    #[error("Conversation busy: {0}")]
    Busy(String),

    /// Rejected as a duplicate of a recent submission
    #[error("Duplicate submission: {0}")]
    Duplicate(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Transport-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Timeout waiting for the response or the next stream chunk
    #[error("Request timed out")]
    Timeout,

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Remote side returned an error
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Invalid response from the remote side
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// Result type alias for Colloquy operations
pub type Result<T> = std::result::Result<T, ColloquyError>;

/// Whether the error is worth one retry of the same round.
///
/// Only transport timeouts qualify; everything else is fatal for the round.
pub fn is_transient(error: &ColloquyError) -> bool {
    matches!(error, ColloquyError::Transport(TransportError::Timeout))
}

/// Category of a fatal error, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Timeout,
    Structural,
    Tool,
    Transport,
    Store,
    Busy,
    Other,
}

impl ColloquyError {
    /// Classify this error for the user-visible notice.
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            ColloquyError::Transport(TransportError::Timeout) => NoticeKind::Timeout,
            ColloquyError::Transport(_) => NoticeKind::Transport,
            ColloquyError::Structural(_) => NoticeKind::Structural,
            ColloquyError::ToolExecution(_) => NoticeKind::Tool,
            ColloquyError::Store(_) | ColloquyError::Io(_) => NoticeKind::Store,
            ColloquyError::Busy(_) | ColloquyError::Duplicate(_) => NoticeKind::Busy,
            ColloquyError::Config(_)
            | ColloquyError::Json(_)
            | ColloquyError::InvalidInput(_) => NoticeKind::Other,
        }
    }
}
