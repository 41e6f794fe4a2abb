//! Conversation turn engine.
//!
//! `ConversationEngine` runs one turn: record the user message, refresh the
//! system prompt with selected lore, call the model, and while the model asks
//! for tools, vet and execute them and feed the results back. Every step is
//! projected into the conversation log.
//!
//! An assistant message that carries tool calls enters memory together with
//! its tool results in a single update, so memory never holds a tool call
//! without its results, even if the turn is cancelled while waiting on an
//! approver.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use parley_types::config::EngineConfig;
use parley_types::conversation::ConversationId;
use parley_types::error::{MemoryError, ProviderError, RepositoryError, VettingError};
use parley_types::event::{ConversationEvent, EventKind, Participant};
use parley_types::lorebook::{Lorebook, LorebookScanOverrides};
use parley_types::message::{AssistantMessage, Message, ToolCall, ToolCallResult};

use crate::conversation::log::ConversationLog;
use crate::conversation::repository::ConversationRepository;
use crate::llm::provider::ChatProvider;
use crate::llm::token_counter::{ApproxTokenCounter, TokenCounter};
use crate::lorebook::selector::LorebookSelector;
use crate::memory::chat_memory::Memory;
use crate::tool::executor::{ToolExecutor, run_tool_call};
use crate::tool::registry::ToolRegistry;
use crate::vetting::coordinator::{Resolution, VettingCoordinator};

use super::prompt::{Persona, compose_system_prompt};

/// Errors that abort a turn.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("vetting error: {0}")]
    Vetting(#[from] VettingError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("model still requested tools after {0} rounds")]
    ToolRoundLimit(u32),
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The final assistant message (no tool calls).
    pub reply: AssistantMessage,
    /// Number of tool-execution rounds the turn needed.
    pub tool_rounds: u32,
    /// Every tool call of the turn with its result, in execution order.
    pub tool_results: Vec<(ToolCall, ToolCallResult)>,
}

pub struct ConversationEngine<P, E, R>
where
    P: ChatProvider,
    E: ToolExecutor,
    R: ConversationRepository + 'static,
{
    provider: P,
    executor: E,
    memory: Box<dyn Memory>,
    log: Arc<ConversationLog<R>>,
    vetting: Arc<VettingCoordinator>,
    tools: ToolRegistry,
    counter: Arc<dyn TokenCounter>,
    selector: LorebookSelector<Arc<dyn TokenCounter>>,
    lorebook: Option<Lorebook>,
    overrides: LorebookScanOverrides,
    persona: Persona,
    max_tool_rounds: u32,
}

impl<P, E, R> ConversationEngine<P, E, R>
where
    P: ChatProvider,
    E: ToolExecutor,
    R: ConversationRepository + 'static,
{
    /// Create an engine for the conversation `memory` is scoped to.
    ///
    /// The conversation must already exist in `log`.
    pub fn new(
        provider: P,
        executor: E,
        memory: Box<dyn Memory>,
        log: Arc<ConversationLog<R>>,
        vetting: Arc<VettingCoordinator>,
        config: &EngineConfig,
    ) -> Self {
        let counter: Arc<dyn TokenCounter> = Arc::new(ApproxTokenCounter);
        Self {
            provider,
            executor,
            memory,
            log,
            vetting,
            tools: ToolRegistry::new(),
            selector: LorebookSelector::new(config.lorebook, counter.clone()),
            counter,
            lorebook: None,
            overrides: LorebookScanOverrides::default(),
            persona: Persona::default(),
            max_tool_rounds: config.engine.max_tool_rounds,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_lorebook(mut self, lorebook: Lorebook, overrides: LorebookScanOverrides) -> Self {
        self.lorebook = Some(lorebook);
        self.overrides = overrides;
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Replace the token counter used for memory and lore budgets.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.selector = LorebookSelector::new(*self.selector.defaults(), counter.clone());
        self.counter = counter;
        self
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.memory.conversation_id()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn memory(&self) -> &dyn Memory {
        self.memory.as_ref()
    }

    /// Run one turn for `text`.
    ///
    /// Cancelling `cancel` aborts a pending model call or vetting wait; tool
    /// executions already started run to completion.
    pub async fn run_turn(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, EngineError> {
        let id = self.conversation_id();
        info!(conversation_id = %id, "turn started");

        self.remember(vec![Message::user(text)])?;
        self.log
            .append(&id, ConversationEvent::user_message(text))
            .await?;

        let mut tool_rounds = 0u32;
        let mut tool_results = Vec::new();
        loop {
            self.refresh_system_prompt()?;
            self.log
                .append(&id, ConversationEvent::assistant_processing())
                .await?;
            let reply = self.send(tool_rounds, cancel).await?;

            self.log
                .append(
                    &id,
                    ConversationEvent::assistant_message(&reply.content, reply.tool_calls.clone()),
                )
                .await?;

            if !reply.has_tool_calls() {
                self.remember(vec![Message::Assistant(reply.clone())])?;
                info!(conversation_id = %id, tool_rounds, "turn finished");
                return Ok(TurnOutcome {
                    reply,
                    tool_rounds,
                    tool_results,
                });
            }

            if tool_rounds >= self.max_tool_rounds {
                return Err(EngineError::ToolRoundLimit(self.max_tool_rounds));
            }
            tool_rounds += 1;

            let results = self.run_tools(&reply.tool_calls, cancel).await?;

            let mut messages = Vec::with_capacity(results.len() + 1);
            messages.push(Message::Assistant(reply));
            messages.extend(results.iter().map(|(call, result)| Message::tool(call, result.clone())));
            self.remember(messages)?;

            for (call, result) in &results {
                self.log
                    .append(
                        &id,
                        ConversationEvent::new(
                            Participant::Tool,
                            EventKind::ToolUseNotification {
                                call: call.clone(),
                                result: result.clone(),
                            },
                        ),
                    )
                    .await?;
            }
            tool_results.extend(results);
        }
    }

    async fn send(
        &self,
        round: u32,
        cancel: &CancellationToken,
    ) -> Result<AssistantMessage, EngineError> {
        let history = self.memory.read();
        let tools = (!self.tools.is_empty()).then(|| self.tools.descriptors());
        let span = info_span!(
            "model.send",
            provider = self.provider.name(),
            round,
            messages = history.len(),
        );

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled.into()),
            reply = self.provider.send(&history, tools).instrument(span) => reply?,
        };
        debug!(
            tool_calls = reply.tool_calls.len(),
            chars = reply.content.len(),
            "model replied"
        );
        Ok(reply)
    }

    /// Vet, then execute, one round of tool calls.
    async fn run_tools(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<(ToolCall, ToolCallResult)>, EngineError> {
        let id = self.conversation_id();
        let batch = self.vetting.begin(id, calls, &self.tools);
        if let Some(request) = batch.request() {
            self.log
                .append(
                    &id,
                    ConversationEvent::new(
                        Participant::System,
                        EventKind::ToolUseVetting {
                            request_id: request.id,
                            calls: request.calls.clone(),
                        },
                    ),
                )
                .await?;
        }

        let outcome = batch.wait(cancel).await?;
        if let Some(request) = &outcome.request {
            self.log
                .append(
                    &id,
                    ConversationEvent::new(
                        Participant::User,
                        EventKind::ToolUseApproval {
                            request_id: request.id,
                            approvals: outcome.decisions(),
                        },
                    ),
                )
                .await?;
        }

        let mut results = Vec::with_capacity(calls.len());
        for resolution in outcome.resolutions() {
            let (call, result) = match resolution {
                Resolution::Approved(approved) => (
                    approved.call(),
                    run_tool_call(&self.executor, &self.tools, approved).await,
                ),
                Resolution::Rejected(call) => (call, ToolCallResult::NotAllowed),
            };
            debug!(tool = %call.name, call_id = %call.id, success = result.is_success(), "tool call resolved");
            results.push((call.clone(), result));
        }
        Ok(results)
    }

    /// Re-select lore against the current history and install the system
    /// prompt. With nothing to say, any earlier system prompt is dropped.
    fn refresh_system_prompt(&self) -> Result<(), MemoryError> {
        let history = self.memory.read();
        let selected = match &self.lorebook {
            Some(lorebook) => self.selector.select(lorebook, &history, &self.overrides),
            None => Vec::new(),
        };
        match compose_system_prompt(&self.persona, &selected) {
            Some(prompt) => self.remember(vec![Message::system(prompt)]),
            None => {
                if self.memory.remove_system() {
                    debug!(conversation_id = %self.conversation_id(), "system prompt cleared");
                }
                Ok(())
            }
        }
    }

    fn remember(&self, mut messages: Vec<Message>) -> Result<(), MemoryError> {
        for message in &mut messages {
            self.counter.stamp(message);
        }
        self.memory.add_all(messages)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use parley_types::event::ToolApproval;
    use parley_types::lorebook::LorebookEntry;
    use parley_types::message::ToolDescriptor;

    use super::*;
    use crate::conversation::memory_repository::InMemoryConversationRepository;
    use crate::memory::build_memory;
    use crate::memory::store::MemoryStore;
    use crate::tool::executor::ApprovedCall;

    /// Replays canned replies and records every history it was sent.
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<AssistantMessage>>,
        seen: Mutex<Vec<Vec<Message>>>,
        repeat_last: bool,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Message>) -> Self {
            let replies = replies
                .into_iter()
                .filter_map(|m| match m {
                    Message::Assistant(a) => Some(a),
                    _ => None,
                })
                .collect();
            Self {
                replies: Mutex::new(replies),
                ..Default::default()
            }
        }

        fn histories(&self) -> Vec<Vec<Message>> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            history: &[Message],
            _tools: Option<&[ToolDescriptor]>,
        ) -> Result<AssistantMessage, ProviderError> {
            self.seen.lock().unwrap().push(history.to_vec());
            let mut replies = self.replies.lock().unwrap();
            let next = if self.repeat_last && replies.len() == 1 {
                replies.front().cloned()
            } else {
                replies.pop_front()
            };
            next.ok_or_else(|| ProviderError::Provider {
                message: "script exhausted".to_string(),
            })
        }
    }

    struct FakeTools;

    impl ToolExecutor for FakeTools {
        async fn execute(&self, call: ApprovedCall<'_>) -> Result<String, String> {
            match call.name.as_str() {
                "broken" => Err("tool crashed".to_string()),
                name => Ok(format!("{name} done")),
            }
        }
    }

    type TestEngine = ConversationEngine<ScriptedProvider, FakeTools, InMemoryConversationRepository>;

    struct Harness {
        engine: TestEngine,
        log: Arc<ConversationLog<InMemoryConversationRepository>>,
        vetting: Arc<VettingCoordinator>,
    }

    async fn harness(provider: ScriptedProvider, config: EngineConfig) -> Harness {
        let log = Arc::new(ConversationLog::new(Arc::new(
            InMemoryConversationRepository::new(),
        )));
        let conversation = log.create(Some("test".to_string())).await.unwrap();
        let memory = build_memory(&config.memory, Arc::new(MemoryStore::new()), conversation.id);
        let vetting = Arc::new(VettingCoordinator::new());
        let engine = ConversationEngine::new(
            provider,
            FakeTools,
            memory,
            log.clone(),
            vetting.clone(),
            &config,
        )
        .with_tools(
            [
                ToolDescriptor::new("clock", "time of day"),
                ToolDescriptor::new("broken", "always fails"),
                ToolDescriptor::new("wire_money", "moves money").with_vetting(true),
            ]
            .into_iter()
            .collect(),
        );
        Harness {
            engine,
            log,
            vetting,
        }
    }

    async fn event_kinds(harness: &Harness) -> Vec<EventKind> {
        harness
            .log
            .read(&harness.engine.conversation_id())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[tokio::test]
    async fn plain_reply_is_remembered_and_logged() {
        let provider = ScriptedProvider::new(vec![Message::assistant("Hello there")]);
        let h = harness(provider, EngineConfig::default()).await;

        let outcome = h.engine.run_turn("hi", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.reply.content, "Hello there");
        assert_eq!(outcome.tool_rounds, 0);

        let memory = h.engine.memory().read();
        assert_eq!(memory.len(), 2);
        assert_eq!(memory[0].text(), "hi");
        assert!(memory.iter().all(|m| m.token_count().is_some()));

        let kinds = event_kinds(&h).await;
        assert!(matches!(kinds[0], EventKind::UserMessage { .. }));
        assert!(matches!(kinds[1], EventKind::AssistantProcessing));
        assert!(matches!(kinds[2], EventKind::AssistantMessage { .. }));

        let conversation = h.log.get(&h.engine.conversation_id()).await.unwrap();
        assert_eq!(conversation.unread_count, 2);
    }

    #[tokio::test]
    async fn tool_results_follow_their_call() {
        let call = ToolCall::new("c1", "clock");
        let failing = ToolCall::new("c2", "broken");
        let missing = ToolCall::new("c3", "teleport");
        let provider = ScriptedProvider::new(vec![
            Message::assistant_with_calls("", vec![call, failing, missing]),
            Message::assistant("It is noon."),
        ]);
        let h = harness(provider, EngineConfig::default()).await;

        let outcome = h.engine.run_turn("time?", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.tool_rounds, 1);
        let results: Vec<&ToolCallResult> = outcome.tool_results.iter().map(|(_, r)| r).collect();
        assert_eq!(
            results,
            vec![
                &ToolCallResult::Success {
                    output: "clock done".to_string()
                },
                &ToolCallResult::ExecutionFailure {
                    reason: "tool crashed".to_string()
                },
                &ToolCallResult::NoSuchTool,
            ]
        );

        let memory = h.engine.memory().read();
        let roles: Vec<String> = memory.iter().map(|m| m.role().to_string()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "tool", "tool", "assistant"]);

        let second_request = &h.engine.provider().histories()[1];
        assert!(second_request.last().unwrap().is_tool());

        let notifications = event_kinds(&h)
            .await
            .into_iter()
            .filter(|k| matches!(k, EventKind::ToolUseNotification { .. }))
            .count();
        assert_eq!(notifications, 3);
    }

    #[tokio::test]
    async fn rejected_call_becomes_not_allowed() {
        let provider = ScriptedProvider::new(vec![
            Message::assistant_with_calls(
                "",
                vec![ToolCall::new("t1", "clock"), ToolCall::new("t2", "wire_money")],
            ),
            Message::assistant("I was not allowed to send money."),
        ]);
        let h = harness(provider, EngineConfig::default()).await;

        let mut requests = h.vetting.subscribe();
        let vetting = h.vetting.clone();
        let approver = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            vetting.submit_approvals(
                request.id,
                &[ToolApproval {
                    call_id: "t2".to_string(),
                    allowed: false,
                }],
            )
        });

        let outcome = h.engine.run_turn("pay rent", &CancellationToken::new()).await.unwrap();
        approver.await.unwrap();

        assert!(outcome.tool_results[0].1.is_success());
        assert_eq!(outcome.tool_results[1].1, ToolCallResult::NotAllowed);

        let kinds = event_kinds(&h).await;
        assert!(kinds.iter().any(|k| matches!(k, EventKind::ToolUseVetting { calls, .. } if calls.len() == 1)));
        assert!(kinds.iter().any(|k| matches!(
            k,
            EventKind::ToolUseApproval { approvals, .. } if approvals == &vec![ToolApproval { call_id: "t2".to_string(), allowed: false }]
        )));
    }

    #[tokio::test]
    async fn cancelled_vetting_leaves_no_dangling_call_in_memory() {
        let provider = ScriptedProvider::new(vec![Message::assistant_with_calls(
            "",
            vec![ToolCall::new("m1", "wire_money")],
        )]);
        let h = harness(provider, EngineConfig::default()).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = h.engine.run_turn("send it", &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Vetting(VettingError::Cancelled(_))));

        let memory = h.engine.memory().read();
        assert_eq!(memory.len(), 1);
        assert!(!memory.iter().any(Message::has_tool_calls));
        assert!(h.vetting.pending_requests().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_send_is_a_provider_cancel() {
        let provider = ScriptedProvider::new(vec![Message::assistant("never seen")]);
        let h = harness(provider, EngineConfig::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h.engine.run_turn("hello", &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(ProviderError::Cancelled)));
    }

    #[tokio::test]
    async fn tool_round_limit_is_enforced() {
        let mut provider = ScriptedProvider::new(vec![Message::assistant_with_calls(
            "",
            vec![ToolCall::new("loop", "clock")],
        )]);
        provider.repeat_last = true;
        let mut config = EngineConfig::default();
        config.engine.max_tool_rounds = 2;
        let h = harness(provider, config).await;

        let err = h.engine.run_turn("spin", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolRoundLimit(2)));
        assert_eq!(h.engine.provider().histories().len(), 3);
    }

    #[tokio::test]
    async fn lore_is_injected_into_system_prompt() {
        let provider = ScriptedProvider::new(vec![Message::assistant("Beware.")]);
        let h = harness(provider, EngineConfig::default()).await;
        let engine = h
            .engine
            .with_persona(Persona {
                system_prompt: "You are {{char}}.".to_string(),
                char_name: "Aria".to_string(),
                user_name: "Sam".to_string(),
            })
            .with_lorebook(
                Lorebook::new(vec![
                    LorebookEntry::new("Dragons breathe fire.", &["dragon"]),
                    LorebookEntry::new("Elves live long.", &["elf"]),
                ]),
                LorebookScanOverrides::default(),
            );

        engine
            .run_turn("tell me about the dragon", &CancellationToken::new())
            .await
            .unwrap();

        let sent = &engine.provider().histories()[0];
        assert!(sent[0].is_system());
        let system = sent[0].text();
        assert!(system.contains("Dragons breathe fire."));
        assert!(system.contains("You are Aria."));
        assert!(!system.contains("Elves"));
    }

    #[tokio::test]
    async fn lore_is_reselected_after_a_tool_round() {
        let provider = ScriptedProvider::new(vec![
            Message::assistant_with_calls("checking the dragon", vec![ToolCall::new("c1", "clock")]),
            Message::assistant("done"),
        ]);
        let h = harness(provider, EngineConfig::default()).await;
        let engine = h.engine.with_lorebook(
            Lorebook::new(vec![LorebookEntry::new("Dragons breathe fire.", &["dragon"])]),
            LorebookScanOverrides {
                scan_depth: Some(1),
                ..LorebookScanOverrides::default()
            },
        );

        engine
            .run_turn("what time is it?", &CancellationToken::new())
            .await
            .unwrap();

        let histories = engine.provider().histories();
        assert!(!histories[0].iter().any(Message::is_system));
        assert!(histories[1][0].is_system());
        assert_eq!(histories[1][0].text(), "Dragons breathe fire.");
    }

    #[tokio::test]
    async fn lore_that_no_longer_matches_is_removed() {
        let provider = ScriptedProvider::new(vec![
            Message::assistant("Fire, mostly."),
            Message::assistant("Sunny."),
        ]);
        let h = harness(provider, EngineConfig::default()).await;
        let engine = h.engine.with_lorebook(
            Lorebook::new(vec![LorebookEntry::new("Dragons breathe fire.", &["dragon"])]),
            LorebookScanOverrides {
                scan_depth: Some(1),
                ..LorebookScanOverrides::default()
            },
        );

        let cancel = CancellationToken::new();
        engine.run_turn("dragon", &cancel).await.unwrap();
        engine.run_turn("weather", &cancel).await.unwrap();

        let histories = engine.provider().histories();
        assert_eq!(histories[0][0].text(), "Dragons breathe fire.");
        assert!(!histories[1].iter().any(Message::is_system));
        assert!(!engine.memory().read().iter().any(Message::is_system));
    }
}
