// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a scripted implementation of the LlmProvider trait that can be
//! used in unit and integration tests without a real transport.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ColloquyError, Result, TransportError};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, EventStream, LlmProvider, StopReason, StreamEvent,
};

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted streaming responses
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Scripted non-streaming responses
    completions: Arc<Mutex<Vec<MockCompletion>>>,
    /// Streaming call counter
    call_count: Arc<AtomicUsize>,
    /// Non-streaming call counter
    completion_count: Arc<AtomicUsize>,
    /// Recorded streaming requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A pre-configured streaming response
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to stream
    pub text: String,
    /// Reasoning to stream before the text
    pub reasoning: Option<String>,
    /// Tool calls to stream after the text
    pub tool_calls: Vec<MockToolCall>,
    /// Stop reason
    pub stop_reason: StopReason,
    /// Injected failure
    pub failure: Option<MockFailure>,
}

/// A mock tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    /// Tool call id; a fresh id is generated per call when unset
    pub id: Option<String>,
    /// Tool name
    pub name: String,
    /// Tool input (JSON)
    pub input: serde_json::Value,
}

/// Ways a scripted response can go wrong
#[derive(Clone, Debug)]
pub enum MockFailure {
    /// Opening the stream fails
    OnOpen(TransportError),
    /// The stream yields the text, then this error
    MidStream(TransportError),
    /// The stream yields the text, then never produces another item
    Stall,
}

/// A pre-configured non-streaming response
#[derive(Clone, Debug)]
pub enum MockCompletion {
    Text(String),
    Failure(TransportError),
}

impl MockResponse {
    /// Plain text reply ending the turn
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Reply requesting one tool call
    pub fn tool_call(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![MockToolCall {
                id: None,
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    /// Reply that fails in the given way
    pub fn failure(failure: MockFailure) -> Self {
        Self {
            text: String::new(),
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// Pin the id of every tool call in this reply (suffixing when there are several)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        let many = self.tool_calls.len() > 1;
        for (i, call) in self.tool_calls.iter_mut().enumerate() {
            call.id = Some(if many {
                format!("{id}_{i}")
            } else {
                id.clone()
            });
        }
        self
    }

    /// Add another tool call to this reply
    pub fn and_tool_call(mut self, name: impl Into<String>, input: serde_json::Value) -> Self {
        self.tool_calls.push(MockToolCall {
            id: None,
            name: name.into(),
            input,
        });
        self.stop_reason = StopReason::ToolUse;
        self
    }

    /// Set the streamed text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the streamed reasoning
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            reasoning: None,
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            failure: None,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(
                target: "colloquy.llm.mock",
                "Mock provider lock was poisoned, recovering"
            );
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            completions: Arc::new(Mutex::new(vec![MockCompletion::Text(
                "Mock summary".to_string(),
            )])),
            call_count: Arc::new(AtomicUsize::new(0)),
            completion_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Queue streaming responses (returned in order, the last one repeats)
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        {
            let mut responses = lock_or_recover(&self.responses);
            *responses = script;
        }
        self
    }

    /// Queue non-streaming responses (returned in order, the last one repeats)
    pub fn with_completions(self, script: Vec<MockCompletion>) -> Self {
        {
            let mut completions = lock_or_recover(&self.completions);
            *completions = script;
        }
        self
    }

    /// Number of streaming calls made
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of non-streaming calls made
    pub fn completion_count(&self) -> usize {
        self.completion_count.load(Ordering::SeqCst)
    }

    /// Get all recorded streaming requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock_or_recover(&self.recorded_requests).clone()
    }

    /// Get the last streaming request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock_or_recover(&self.recorded_requests).last().cloned()
    }

    fn next_response(&self) -> MockResponse {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = lock_or_recover(&self.responses);
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses[count.min(responses.len() - 1)].clone()
        }
    }

    fn next_completion(&self) -> MockCompletion {
        let count = self.completion_count.fetch_add(1, Ordering::SeqCst);
        let completions = lock_or_recover(&self.completions);
        if completions.is_empty() {
            MockCompletion::Text("Mock summary".to_string())
        } else {
            completions[count.min(completions.len() - 1)].clone()
        }
    }
}

fn response_events(response: MockResponse) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    if let Some(reasoning) = response.reasoning {
        events.push(Ok(StreamEvent::ReasoningDelta(reasoning)));
        events.push(Ok(StreamEvent::ReasoningSignature("mock-signature".to_string())));
    }

    // Stream the text in chunks
    for chunk in response.text.chars().collect::<Vec<_>>().chunks(10) {
        events.push(Ok(StreamEvent::TextDelta(chunk.iter().collect())));
    }

    match response.failure {
        Some(MockFailure::MidStream(error)) => {
            events.push(Err(ColloquyError::Transport(error)));
            return events;
        }
        Some(MockFailure::Stall) => return events,
        _ => {}
    }

    for call in response.tool_calls {
        let id = call
            .id
            .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));
        events.push(Ok(StreamEvent::ToolCallStart {
            id,
            name: call.name,
        }));
        let input = call.input.to_string();
        let split = input.len() / 2;
        let (head, tail) = input.split_at(if input.is_char_boundary(split) {
            split
        } else {
            0
        });
        for part in [head, tail] {
            if !part.is_empty() {
                events.push(Ok(StreamEvent::ToolCallInputDelta {
                    partial_json: part.to_string(),
                }));
            }
        }
        events.push(Ok(StreamEvent::ToolCallEnd));
    }

    events.push(Ok(StreamEvent::Done(response.stop_reason)));
    events
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        match self.next_completion() {
            MockCompletion::Text(text) => Ok(CompletionResponse {
                text,
                reasoning: None,
            }),
            MockCompletion::Failure(error) => Err(ColloquyError::Transport(error)),
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        lock_or_recover(&self.recorded_requests).push(request);

        let response = self.next_response();
        if let Some(MockFailure::OnOpen(error)) = &response.failure {
            return Err(ColloquyError::Transport(error.clone()));
        }
        let stalls = matches!(response.failure, Some(MockFailure::Stall));
        let events = stream::iter(response_events(response));

        if stalls {
            Ok(Box::pin(events.chain(stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }
}
