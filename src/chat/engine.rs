// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-invocation cycle
//!
//! One user submission runs as a loop of rounds. Each round rebuilds the
//! transmission view from the durable store, certifies it, streams the model
//! response, and either finishes or executes the requested tools and appends
//! the invocation/result pair before the next round.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::ToolLoopConfig;
use crate::context::WindowManager;
use crate::error::{is_transient, ColloquyError, Result, TransportError};
use crate::history::{read_or_empty, HistoryStore};
use crate::llm::json::{estimate_json_size, simplify_json, SimplifyLimits};
use crate::llm::message::{ContentBlock, Role, Turn};
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::protocol::{sanitize, validate};
use crate::tools::{ToolExecutor, ToolOutcome};

use super::streaming::{AccumulatedResponse, StreamAccumulator, StreamEventResult, ToolCall};

/// Assistant text appended when a new user turn follows an unanswered tool result
pub const INTERRUPTED_ROUND_TEXT: &str = "[previous tool round was interrupted]";

/// Text of the assistant turn appended when the round cap is hit
pub fn max_rounds_notice(rounds: usize) -> String {
    format!("[stopped after {rounds} tool rounds without a final answer]")
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The model answered without requesting a tool
    Completed { turn: Turn, rounds: usize },
    /// The round cap was reached
    MaxRounds { rounds: usize },
    /// The caller cancelled the cycle
    Cancelled { rounds: usize },
}

impl CycleOutcome {
    pub fn rounds(&self) -> usize {
        match self {
            CycleOutcome::Completed { rounds, .. }
            | CycleOutcome::MaxRounds { rounds }
            | CycleOutcome::Cancelled { rounds } => *rounds,
        }
    }
}

/// Hooks for callers that render progress. All methods default to no-ops.
pub trait CycleObserver {
    fn on_round_start(&mut self, _round: usize) -> Result<()> {
        Ok(())
    }

    fn on_view_compressed(&mut self, _compressed_turns: usize) -> Result<()> {
        Ok(())
    }

    fn on_text_delta(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    fn on_reasoning_delta(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// The round failed with a timeout and will be restarted after `delay`.
    /// Deltas already reported for the round are void.
    fn on_retry(&mut self, _round: usize, _delay: Duration) -> Result<()> {
        Ok(())
    }

    fn on_tool_invocation(&mut self, _call: &ToolCall) -> Result<()> {
        Ok(())
    }

    fn on_tool_result(&mut self, _call: &ToolCall, _outcome: &ToolOutcome) -> Result<()> {
        Ok(())
    }
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default)]
pub struct NoopCycleObserver;

impl CycleObserver for NoopCycleObserver {}

/// Drives tool-invocation cycles against injected collaborators
#[derive(Clone)]
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    store: Arc<dyn HistoryStore>,
    window: WindowManager,
    config: ToolLoopConfig,
    json_limits: SimplifyLimits,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolExecutor>,
        store: Arc<dyn HistoryStore>,
        window: WindowManager,
        config: ToolLoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            window,
            config,
            json_limits: SimplifyLimits::default(),
        }
    }

    /// Bounds used when shrinking oversized tool inputs in the view
    pub fn with_json_limits(mut self, limits: SimplifyLimits) -> Self {
        self.json_limits = limits;
        self
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn window(&self) -> &WindowManager {
        &self.window
    }

    pub fn config(&self) -> &ToolLoopConfig {
        &self.config
    }

    /// Run one cycle for `user_turn`.
    ///
    /// The user turn is appended first. Fatal errors leave the durable log
    /// as it was at the start of the failing round.
    pub async fn run(
        &self,
        user_turn: Turn,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<CycleOutcome> {
        tracing::info!(
            target: "colloquy.chat.engine",
            model = %self.config.model,
            max_rounds = self.config.max_tool_rounds,
            "cycle start"
        );

        let result = self.run_inner(user_turn, cancel, observer).await;

        match &result {
            Ok(CycleOutcome::Completed { rounds, .. }) => tracing::info!(
                target: "colloquy.chat.engine",
                rounds,
                "cycle complete"
            ),
            Ok(CycleOutcome::MaxRounds { rounds }) => tracing::info!(
                target: "colloquy.chat.engine",
                rounds,
                "cycle stopped at round cap"
            ),
            Ok(CycleOutcome::Cancelled { rounds }) => tracing::info!(
                target: "colloquy.chat.engine",
                rounds,
                "cycle cancelled"
            ),
            Err(error) => tracing::warn!(
                target: "colloquy.chat.engine",
                error = %error,
                "cycle failed"
            ),
        }

        result
    }

    async fn run_inner(
        &self,
        user_turn: Turn,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<CycleOutcome> {
        self.append_user_turn(user_turn).await?;

        let mut rounds = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(CycleOutcome::Cancelled { rounds });
            }
            rounds += 1;
            observer.on_round_start(rounds)?;

            let view = self.prepare_view(observer).await?;
            tracing::debug!(
                target: "colloquy.chat.engine",
                round = rounds,
                view_turns = view.len(),
                "sending transmission view"
            );

            let Some(response) = self.stream_with_retry(view, rounds, cancel, observer).await?
            else {
                return Ok(CycleOutcome::Cancelled { rounds });
            };

            let assistant = response.assistant_turn();
            if !response.has_tool_calls() {
                self.store.append(assistant.clone()).await?;
                return Ok(CycleOutcome::Completed {
                    turn: assistant,
                    rounds,
                });
            }

            tracing::info!(
                target: "colloquy.chat.engine",
                round = rounds,
                tool_calls = response.tool_calls.len(),
                "entering tool execution phase"
            );
            let Some(results) = self
                .execute_tools(&response.tool_calls, cancel, observer)
                .await?
            else {
                return Ok(CycleOutcome::Cancelled { rounds });
            };

            self.store.append(assistant).await?;
            self.store.append(Turn::user_blocks(results)).await?;

            if rounds >= self.config.max_tool_rounds {
                self.store
                    .append(Turn::assistant(max_rounds_notice(rounds)))
                    .await?;
                return Ok(CycleOutcome::MaxRounds { rounds });
            }
        }
    }

    async fn append_user_turn(&self, user_turn: Turn) -> Result<()> {
        if user_turn.role != Role::User {
            return Err(ColloquyError::InvalidInput(
                "submitted turn must be user-role".to_string(),
            ));
        }
        if user_turn.content.iter().all(ContentBlock::is_blank) {
            return Err(ColloquyError::InvalidInput(
                "submitted turn is empty".to_string(),
            ));
        }

        let history = read_or_empty(self.store.as_ref()).await;
        if let Some(last) = history.last() {
            if last.role == Role::User && !last.tool_result_ids().is_empty() {
                self.store
                    .append(Turn::assistant(INTERRUPTED_ROUND_TEXT))
                    .await?;
            } else if last.role == Role::User
                && !last.has_tool_blocks()
                && !user_turn.has_tool_blocks()
                && last.text() == user_turn.text()
            {
                tracing::debug!(
                    target: "colloquy.chat.engine",
                    "user turn repeats the last durable turn, not appending"
                );
                return Ok(());
            }
        }

        self.store.append(user_turn).await
    }

    async fn prepare_view(&self, observer: &mut (dyn CycleObserver + Send)) -> Result<Vec<Turn>> {
        let history = read_or_empty(self.store.as_ref()).await;
        let view = self.window.transmission_view(&history).await;
        if let Some(compressed) = view.compressed {
            observer.on_view_compressed(compressed)?;
        }

        let turns = self.simplify_tool_inputs(view.turns);
        let turns = sanitize(&turns);
        validate(&turns)?;
        Ok(turns)
    }

    fn simplify_tool_inputs(&self, mut turns: Vec<Turn>) -> Vec<Turn> {
        let limit = self.window.config().tool_input_char_limit;
        for turn in &mut turns {
            for block in &mut turn.content {
                if let ContentBlock::ToolUse { id, input, .. } = block {
                    let size = estimate_json_size(input);
                    if size > limit {
                        tracing::debug!(
                            target: "colloquy.chat.engine",
                            tool_use_id = %id,
                            size,
                            "simplifying oversized tool input for transmission"
                        );
                        *input = simplify_json(input, &self.json_limits);
                    }
                }
            }
        }
        turns
    }

    fn build_request(&self, view: Vec<Turn>) -> CompletionRequest {
        let request = CompletionRequest::new(self.config.model.clone(), view)
            .with_max_tokens(self.config.max_tokens)
            .with_tools(self.tools.definitions());
        match &self.config.system_prompt {
            Some(system) => request.with_system(system.clone()),
            None => request,
        }
    }

    /// Stream one round. A timeout restarts the round once, with the same
    /// view, after the configured backoff. `None` means cancelled.
    async fn stream_with_retry(
        &self,
        view: Vec<Turn>,
        round: usize,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<Option<AccumulatedResponse>> {
        let request = self.build_request(view);

        match self.stream_once(request.clone(), cancel, observer).await {
            Err(error) if is_transient(&error) => {
                let delay = self.config.retry_backoff();
                tracing::warn!(
                    target: "colloquy.chat.engine",
                    round,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient transport error, retrying round once"
                );
                observer.on_retry(round, delay)?;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(delay) => {}
                }
                self.stream_once(request, cancel, observer).await
            }
            other => other,
        }
    }

    async fn stream_once(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<Option<AccumulatedResponse>> {
        let idle = self.config.stream_idle_timeout();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            opened = tokio::time::timeout(idle, self.provider.complete_stream(request)) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream?,
            Err(_) => return Err(TransportError::Timeout.into()),
        };

        let mut accumulator = StreamAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = tokio::time::timeout(idle, stream.next()) => next,
            };
            let event = match next {
                Err(_) => {
                    tracing::debug!(
                        target: "colloquy.chat.engine",
                        idle_ms = idle.as_millis() as u64,
                        "stream stalled"
                    );
                    return Err(TransportError::Timeout.into());
                }
                Ok(None) => break,
                Ok(Some(event)) => event?,
            };

            match accumulator.process_event(event) {
                StreamEventResult::TextDelta(text) => observer.on_text_delta(&text)?,
                StreamEventResult::ReasoningDelta(text) => observer.on_reasoning_delta(&text)?,
                StreamEventResult::Done(_) => break,
                _ => {}
            }
        }

        Ok(Some(accumulator.finish()))
    }

    /// Run the calls in order. `None` means cancelled; a running tool is
    /// detached and its result dropped.
    async fn execute_tools(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
        observer: &mut (dyn CycleObserver + Send),
    ) -> Result<Option<Vec<ContentBlock>>> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            observer.on_tool_invocation(call)?;
            tracing::info!(
                target: "colloquy.chat.engine",
                tool = %call.name,
                tool_use_id = %call.id,
                "executing tool"
            );

            let tools = Arc::clone(&self.tools);
            let (id, name, input) = (call.id.clone(), call.name.clone(), call.input.clone());
            let handle = tokio::spawn(async move { tools.execute(&id, &name, input).await });

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        target: "colloquy.chat.engine",
                        tool = %call.name,
                        tool_use_id = %call.id,
                        "cancelled during tool execution, result will be discarded"
                    );
                    return Ok(None);
                }
                joined = handle => joined,
            };

            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => {
                    tracing::debug!(
                        target: "colloquy.chat.engine",
                        tool = %call.name,
                        error = %error,
                        "tool execution error recorded as result"
                    );
                    ToolOutcome::error(error.to_string())
                }
                Err(join_error) => {
                    return Err(ColloquyError::ToolExecution(format!(
                        "tool '{}' ({}) did not finish: {join_error}",
                        call.name, call.id
                    )));
                }
            };

            observer.on_tool_result(call, &outcome)?;
            results.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: outcome.result_content(),
                status: outcome.status,
            });
        }

        Ok(Some(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::streaming::TOOL_ROUND_TEXT;
    use crate::config::WindowConfig;
    use crate::history::MemoryHistoryStore;
    use crate::llm::message::ToolStatus;
    use crate::llm::mock_provider::{MockFailure, MockProvider, MockResponse};
    use crate::tools::mock::MockToolBehavior;
    use crate::tools::MockToolExecutor;
    use serde_json::json;

    fn fast_config() -> ToolLoopConfig {
        ToolLoopConfig {
            retry_backoff_ms: 10,
            stream_idle_timeout_ms: 200,
            ..ToolLoopConfig::default()
        }
    }

    fn orchestrator(
        provider: &MockProvider,
        tools: &MockToolExecutor,
        store: &MemoryHistoryStore,
        config: ToolLoopConfig,
    ) -> Orchestrator {
        let provider: Arc<dyn LlmProvider> = Arc::new(provider.clone());
        let window = WindowManager::new(WindowConfig::default(), provider.clone(), "mock-model");
        Orchestrator::new(
            provider,
            Arc::new(tools.clone()),
            Arc::new(store.clone()),
            window,
            config,
        )
    }

    #[derive(Default)]
    struct Recorder {
        rounds: Vec<usize>,
        text: String,
        retries: usize,
        tools: Vec<String>,
    }

    impl CycleObserver for Recorder {
        fn on_round_start(&mut self, round: usize) -> Result<()> {
            self.rounds.push(round);
            Ok(())
        }

        fn on_text_delta(&mut self, text: &str) -> Result<()> {
            self.text.push_str(text);
            Ok(())
        }

        fn on_retry(&mut self, _round: usize, _delay: Duration) -> Result<()> {
            self.retries += 1;
            self.text.clear();
            Ok(())
        }

        fn on_tool_invocation(&mut self, call: &ToolCall) -> Result<()> {
            self.tools.push(call.name.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_simple_exchange() {
        let provider = MockProvider::new().with_response("Hi");
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let mut observer = Recorder::default();
        let outcome = orch
            .run(Turn::user("Hello"), &CancellationToken::new(), &mut observer)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                turn: Turn::assistant("Hi"),
                rounds: 1
            }
        );
        assert_eq!(store.snapshot(), vec![Turn::user("Hello"), Turn::assistant("Hi")]);
        assert_eq!(observer.text, "Hi");
        assert_eq!(observer.rounds, vec![1]);
    }

    #[tokio::test]
    async fn test_one_tool_round() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("lookup", json!({})).with_id("t1"),
            MockResponse::text("The answer is 42."),
        ]);
        let tools = MockToolExecutor::new().with_outcome("lookup", ToolOutcome::success("42"));
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let outcome = orch
            .run(
                Turn::user("X"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await
            .unwrap();
        assert_eq!(outcome.rounds(), 2);

        let history = store.snapshot();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], Turn::user("X"));
        assert_eq!(
            history[1],
            Turn::assistant_blocks(vec![
                ContentBlock::text(TOOL_ROUND_TEXT),
                ContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "lookup".to_string(),
                    input: json!({}),
                },
            ])
        );
        assert_eq!(history[2], Turn::tool_result("t1", "42", ToolStatus::Success));
        assert_eq!(history[3], Turn::assistant("The answer is 42."));
        assert!(validate(&history).is_ok());

        // The second round saw the pair.
        let second = provider.last_request().unwrap();
        assert_eq!(second.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_round_cap() {
        let provider =
            MockProvider::new().with_script(vec![MockResponse::tool_call("lookup", json!({}))]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let config = ToolLoopConfig {
            max_tool_rounds: 2,
            ..fast_config()
        };
        let orch = orchestrator(&provider, &tools, &store, config);

        let outcome = orch
            .run(
                Turn::user("loop"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await
            .unwrap();

        assert_eq!(outcome, CycleOutcome::MaxRounds { rounds: 2 });
        assert_eq!(provider.call_count(), 2);
        assert_eq!(tools.calls().len(), 2);
        let history = store.snapshot();
        assert_eq!(history.len(), 6);
        assert_eq!(history[5], Turn::assistant(max_rounds_notice(2)));
        assert!(validate(&history).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_retried_once() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::failure(MockFailure::MidStream(TransportError::Timeout)),
            MockResponse::text("Recovered"),
        ]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let mut observer = Recorder::default();
        let outcome = orch
            .run(Turn::user("Hello"), &CancellationToken::new(), &mut observer)
            .await
            .unwrap();

        assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        assert_eq!(observer.retries, 1);
        assert_eq!(observer.text, "Recovered");
        assert_eq!(provider.call_count(), 2);
        let requests = provider.recorded_requests();
        assert_eq!(requests[0].messages, requests[1].messages);
    }

    #[tokio::test]
    async fn test_second_timeout_is_fatal() {
        let provider = MockProvider::new().with_script(vec![MockResponse::failure(
            MockFailure::OnOpen(TransportError::Timeout),
        )]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let err = orch
            .run(
                Turn::user("Hello"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await
            .unwrap_err();
        assert!(is_transient(&err));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(store.snapshot(), vec![Turn::user("Hello")]);
    }

    #[tokio::test]
    async fn test_other_transport_errors_not_retried() {
        let provider = MockProvider::new().with_script(vec![MockResponse::failure(
            MockFailure::OnOpen(TransportError::ServerError {
                status: 500,
                message: "boom".to_string(),
            }),
        )]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let result = orch
            .run(
                Turn::user("Hello"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await;
        assert!(matches!(
            result,
            Err(ColloquyError::Transport(TransportError::ServerError { .. }))
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stalled_stream_counts_as_timeout() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::failure(MockFailure::Stall).with_text("partial"),
            MockResponse::text("done"),
        ]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let outcome = orch
            .run(
                Turn::user("Hello"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CycleOutcome::Completed {
                turn: Turn::assistant("done"),
                rounds: 1
            }
        );
    }

    #[tokio::test]
    async fn test_tool_error_continues_cycle() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("broken", json!({"x": 1})).with_id("t1"),
            MockResponse::text("It failed, sorry."),
        ]);
        let tools = MockToolExecutor::new()
            .with_tool("broken", MockToolBehavior::Fail("disk on fire".to_string()));
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let outcome = orch
            .run(
                Turn::user("Try it"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed { rounds: 2, .. }));

        let history = store.snapshot();
        match &history[2].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                status,
            } => {
                assert_eq!(tool_use_id, "t1");
                assert!(content.contains("disk on fire"));
                assert_eq!(*status, ToolStatus::Error);
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_in_one_round() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("a", json!({}))
                .and_tool_call("b", json!({}))
                .with_id("t"),
            MockResponse::text("both done"),
        ]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let mut observer = Recorder::default();
        orch.run(Turn::user("go"), &CancellationToken::new(), &mut observer)
            .await
            .unwrap();

        assert_eq!(observer.tools, vec!["a", "b"]);
        let history = store.snapshot();
        assert_eq!(history[1].tool_use_ids(), history[2].tool_result_ids());
        assert_eq!(history[1].tool_use_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let provider = MockProvider::new();
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = orch
            .run(Turn::user("Hello"), &cancel, &mut NoopCycleObserver)
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled { rounds: 0 });
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.snapshot(), vec![Turn::user("Hello")]);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_leaves_history_untouched() {
        let provider = MockProvider::new()
            .with_script(vec![MockResponse::failure(MockFailure::Stall).with_text("partial")]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let config = ToolLoopConfig {
            stream_idle_timeout_ms: 5_000,
            ..fast_config()
        };
        let orch = orchestrator(&provider, &tools, &store, config);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut observer = Recorder::default();
        let outcome = orch
            .run(Turn::user("Hello"), &cancel, &mut observer)
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled { rounds: 1 });
        assert_eq!(observer.text, "partial");
        assert_eq!(observer.retries, 0);
        assert_eq!(store.snapshot(), vec![Turn::user("Hello")]);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_backoff() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::failure(MockFailure::MidStream(TransportError::Timeout)),
            MockResponse::text("too late"),
        ]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let config = ToolLoopConfig {
            retry_backoff_ms: 5_000,
            ..fast_config()
        };
        let orch = orchestrator(&provider, &tools, &store, config);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let mut observer = Recorder::default();
        let outcome = orch
            .run(Turn::user("Hello"), &cancel, &mut observer)
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled { rounds: 1 });
        assert_eq!(observer.retries, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(store.snapshot(), vec![Turn::user("Hello")]);
    }

    #[tokio::test]
    async fn test_cancel_during_tool_discards_result() {
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("slow", json!({})).with_id("t1"),
        ]);
        let tools = MockToolExecutor::new().with_tool(
            "slow",
            MockToolBehavior::Delayed(Duration::from_millis(100), ToolOutcome::success("late")),
        );
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome = orch
            .run(Turn::user("slow please"), &cancel, &mut NoopCycleObserver)
            .await
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Cancelled { rounds: 1 });
        assert_eq!(store.snapshot(), vec![Turn::user("slow please")]);

        // The detached tool still finishes on its own.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(tools.completed(), vec!["t1".to_string()]);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_user_turn_not_appended_twice() {
        let provider = MockProvider::new().with_response("Hi");
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::with_turns(vec![Turn::user("Hello")]);
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        orch.run(
            Turn::user("Hello"),
            &CancellationToken::new(),
            &mut NoopCycleObserver,
        )
        .await
        .unwrap();
        assert_eq!(store.snapshot(), vec![Turn::user("Hello"), Turn::assistant("Hi")]);
    }

    #[tokio::test]
    async fn test_dangling_tool_result_gets_bridge_turn() {
        let provider = MockProvider::new().with_response("Fine");
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::with_turns(vec![
            Turn::user("X"),
            Turn::assistant_blocks(vec![ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "lookup".to_string(),
                input: json!({}),
            }]),
            Turn::tool_result("t1", "42", ToolStatus::Success),
        ]);
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        orch.run(
            Turn::user("next"),
            &CancellationToken::new(),
            &mut NoopCycleObserver,
        )
        .await
        .unwrap();

        let history = store.snapshot();
        assert_eq!(history[3], Turn::assistant(INTERRUPTED_ROUND_TEXT));
        assert_eq!(history[4], Turn::user("next"));
        assert!(validate(&history).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_assistant_submission() {
        let provider = MockProvider::new();
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        let result = orch
            .run(
                Turn::assistant("nope"),
                &CancellationToken::new(),
                &mut NoopCycleObserver,
            )
            .await;
        assert!(matches!(result, Err(ColloquyError::InvalidInput(_))));
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_tool_input_simplified_in_view_only() {
        let big = json!({"blob": "x".repeat(40_000)});
        let provider = MockProvider::new().with_script(vec![
            MockResponse::tool_call("write", big.clone()).with_id("t1"),
            MockResponse::text("written"),
        ]);
        let tools = MockToolExecutor::new();
        let store = MemoryHistoryStore::new();
        let orch = orchestrator(&provider, &tools, &store, fast_config());

        orch.run(
            Turn::user("save it"),
            &CancellationToken::new(),
            &mut NoopCycleObserver,
        )
        .await
        .unwrap();

        let history = store.snapshot();
        match &history[1].content[1] {
            ContentBlock::ToolUse { input, .. } => assert_eq!(input, &big),
            other => panic!("expected tool use, got {other:?}"),
        }

        let sent = provider.last_request().unwrap();
        match &sent.messages[1].content[1] {
            ContentBlock::ToolUse { input, .. } => {
                assert!(estimate_json_size(input) < estimate_json_size(&big))
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }
}
