// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session management
//!
//! Binds one conversation id to its store, guard, and orchestrator, and keeps
//! the UI-visible transcript. Fatal errors land in the transcript as a
//! single system notice; the durable log never sees them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::context::WindowManager;
use crate::error::{ColloquyError, NoticeKind, Result};
use crate::history::{read_or_empty, ConversationId, HistoryStore, JsonlHistoryStore};
use crate::llm::message::Turn;
use crate::llm::provider::LlmProvider;
use crate::protocol::{sanitize, validate};
use crate::tools::{ToolExecutor, ToolRegistry};

use super::engine::{max_rounds_notice, CycleObserver, CycleOutcome, Orchestrator};
use super::guard::DedupGuard;
use super::title::generate_title;

/// One entry of the UI-visible transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Turn {
        turn: Turn,
    },
    SystemNotice {
        kind: NoticeKind,
        message: String,
        at: DateTime<Utc>,
    },
}

impl TranscriptEntry {
    /// Notice describing a fatal error
    pub fn notice(error: &ColloquyError) -> Self {
        let kind = error.notice_kind();
        let lead = match kind {
            NoticeKind::Timeout => "The model did not respond in time",
            NoticeKind::Structural => "The conversation could not be sent as it is",
            NoticeKind::Tool => "A tool could not be run",
            NoticeKind::Transport => "The model request failed",
            NoticeKind::Store => "The conversation could not be saved",
            NoticeKind::Busy => "The conversation is busy",
            NoticeKind::Other => "Something went wrong",
        };
        TranscriptEntry::SystemNotice {
            kind,
            message: format!("{lead}: {error}"),
            at: Utc::now(),
        }
    }
}

/// Encapsulates all state for one conversation
pub struct ChatSession {
    id: ConversationId,
    orchestrator: Orchestrator,
    guard: Arc<DedupGuard>,
    transcript: Vec<TranscriptEntry>,
}

/// Builder for creating ChatSession instances
pub struct ChatSessionBuilder {
    settings: Settings,
    id: Option<ConversationId>,
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    store: Option<Arc<dyn HistoryStore>>,
    guard: Option<Arc<DedupGuard>>,
}

impl ChatSessionBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            id: None,
            provider: None,
            tools: None,
            store: None,
            guard: None,
        }
    }

    /// Resume or pin a conversation id
    pub fn with_id(mut self, id: ConversationId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Use this store instead of the JSONL file under the history directory
    pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a guard with other sessions of the same conversation
    pub fn with_guard(mut self, guard: Arc<DedupGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn build(self) -> Result<ChatSession> {
        self.settings.validate()?;
        let provider = self
            .provider
            .ok_or_else(|| ColloquyError::Config("a completion provider is required".to_string()))?;
        let id = self.id.unwrap_or_default();

        let store: Arc<dyn HistoryStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonlHistoryStore::open(
                &self.settings.history.directory,
                id,
            )?),
        };
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()));
        let guard = self
            .guard
            .unwrap_or_else(|| Arc::new(DedupGuard::new(self.settings.guard.duplicate_window())));

        let window = WindowManager::new(
            self.settings.window.clone(),
            Arc::clone(&provider),
            self.settings.tool_loop.model.clone(),
        );
        let orchestrator =
            Orchestrator::new(provider, tools, store, window, self.settings.tool_loop);

        tracing::debug!(
            target: "colloquy.chat.session",
            conversation = %id,
            "chat session ready"
        );
        Ok(ChatSession::new(id, orchestrator, guard))
    }
}

impl ChatSession {
    pub fn new(id: ConversationId, orchestrator: Orchestrator, guard: Arc<DedupGuard>) -> Self {
        Self {
            id,
            orchestrator,
            guard,
            transcript: Vec::new(),
        }
    }

    /// Create a new session builder
    pub fn builder(settings: Settings) -> ChatSessionBuilder {
        ChatSessionBuilder::new(settings)
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// UI-visible transcript, including system notices
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Durable turns of this conversation
    pub async fn history(&self) -> Vec<Turn> {
        read_or_empty(self.orchestrator.store().as_ref()).await
    }

    /// Submit user text
    pub async fn submit(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<CycleOutcome> {
        self.submit_turn(Turn::user(text), cancel, observer).await
    }

    /// Submit a user turn through the guard.
    ///
    /// Guard rejections are returned without touching the transcript.
    pub async fn submit_turn(
        &mut self,
        turn: Turn,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<CycleOutcome> {
        let text = turn.text();
        let _permit = if text.trim().is_empty() {
            self.guard.try_acquire()?
        } else {
            self.guard.admit(&text)?
        };

        self.transcript.push(TranscriptEntry::Turn { turn: turn.clone() });
        match self.orchestrator.run(turn, cancel, observer).await {
            Ok(outcome) => {
                match &outcome {
                    CycleOutcome::Completed { turn, .. } => {
                        self.transcript
                            .push(TranscriptEntry::Turn { turn: turn.clone() });
                    }
                    CycleOutcome::MaxRounds { rounds } => {
                        self.transcript.push(TranscriptEntry::Turn {
                            turn: Turn::assistant(max_rounds_notice(*rounds)),
                        });
                    }
                    CycleOutcome::Cancelled { .. } => {}
                }
                Ok(outcome)
            }
            Err(error) => {
                self.transcript.push(TranscriptEntry::notice(&error));
                Err(error)
            }
        }
    }

    /// Condense the durable log into a summary plus the recent turns.
    ///
    /// Holds the single flight for the whole rewrite. Returns how many turns
    /// were folded into the summary (0 when there was nothing to fold).
    pub async fn organize_context(&mut self) -> Result<usize> {
        let _permit = self.guard.try_acquire()?;

        let result = self.compact_history().await;
        if let Err(error) = &result {
            self.transcript.push(TranscriptEntry::notice(error));
        }
        result
    }

    async fn compact_history(&self) -> Result<usize> {
        let store = self.orchestrator.store();
        let history = read_or_empty(store.as_ref()).await;

        let Some((compacted, folded)) = self.orchestrator.window().compact(&history).await else {
            return Ok(0);
        };
        let compacted = sanitize(&compacted);
        validate(&compacted)?;
        store.replace_all(compacted).await?;

        tracing::info!(
            target: "colloquy.context.window",
            conversation = %self.id,
            folded,
            "organized conversation history"
        );
        Ok(folded)
    }

    /// Title for this conversation
    pub async fn title(&self) -> String {
        let history = self.history().await;
        generate_title(
            self.orchestrator.provider().as_ref(),
            &self.orchestrator.config().model,
            &history,
        )
        .await
    }
}
