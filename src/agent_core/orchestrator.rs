//! Orchestrator — the per-conversation state machine driving a turn.
//!
//! ```text
//! AWAITING_INPUT → MODEL_CALL → FINISHED
//!                      ↓   ↑
//!               DISPATCHING_TOOLS
//! ```
//!
//! - `AWAITING_INPUT`: append the user message.
//! - `MODEL_CALL`: compact history, send it with every tool schema. A final
//!   answer finishes the turn; tool requests are appended and dispatched.
//! - `DISPATCHING_TOOLS`: run the router, append results in request order,
//!   go back to `MODEL_CALL`.
//!
//! A turn works on a copy of the message store and commits it only when it
//! reaches `FINISHED`. Errors, cancellation, or dropping the `run_turn`
//! future leave the committed history untouched. The audit log is the
//! exception: tool side effects happened, so their entries are kept.
//!
//! The round counter bounds cost: after `max_tool_rounds` dispatch rounds,
//! a model that still asks for tools fails the turn with `RunawayToolLoop`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::inference::endpoint::ModelEndpoint;
use crate::inference::summarizer::Summarizer;
use crate::inference::tool_call_parser::assign_call_id;
use crate::inference::types::{Message, ModelRequest, ModelResponse, RawToolCall, ToolCallRequest};

use super::approval::ApprovalGate;
use super::compaction::{CompactionPolicy, CompactionState, ContextCompactor};
use super::config::AgentConfig;
use super::conversation::MessageStore;
use super::errors::AgentError;
use super::registry::ToolRegistry;
use super::tokens::CostFn;
use super::tool_router::ToolRouter;
use super::types::{AuditEntry, TurnOutcome, TurnState};

// ─── Cancellation ───────────────────────────────────────────────────────────

/// Requests cancellation of the running turn.
///
/// Checked whenever the orchestrator enters a state, i.e. between suspension
/// points. In-flight tool executions finish; the partial turn is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag and report whether it was set.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Owns one conversation: its message store, compaction state and audit log.
pub struct Orchestrator {
    conversation_id: String,
    endpoint: Arc<dyn ModelEndpoint>,
    router: ToolRouter,
    compactor: ContextCompactor,
    config: AgentConfig,
    store: MessageStore,
    state: TurnState,
    audit_log: Vec<AuditEntry>,
    cancel: CancelHandle,
}

impl Orchestrator {
    /// Build an orchestrator for a new conversation.
    ///
    /// The registry is shared read-only; the endpoint and gate are explicit
    /// collaborators, so independent conversations never share mutable state.
    pub fn new(
        endpoint: Arc<dyn ModelEndpoint>,
        registry: Arc<ToolRegistry>,
        gate: Arc<dyn ApprovalGate>,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        config.validate()?;

        let store = match config.system_prompt.as_deref() {
            Some(prompt) => MessageStore::with_system_prompt(prompt),
            None => MessageStore::new(),
        };
        let conversation_id = Uuid::new_v4().to_string();

        tracing::info!(
            conversation_id = %conversation_id,
            model = %config.model,
            tools = registry.len(),
            compaction = ?config.compaction.strategy,
            "conversation started"
        );

        Ok(Self {
            conversation_id,
            endpoint,
            router: ToolRouter::new(registry, gate, config.dispatch.clone()),
            compactor: ContextCompactor::new(CompactionPolicy::from_config(&config.compaction)),
            store,
            state: TurnState::AwaitingInput,
            audit_log: Vec::new(),
            cancel: CancelHandle::default(),
            config,
        })
    }

    /// Summarizer for the summarize and hierarchical compaction policies.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.compactor = self.compactor.with_summarizer(summarizer);
        self
    }

    /// Token estimator for the token-budget compaction policy.
    pub fn with_cost_fn(mut self, cost_fn: CostFn) -> Self {
        self.compactor = self.compactor.with_cost_fn(cost_fn);
        self
    }

    /// Replace the conversation with one holding only `prompt`.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.store = MessageStore::with_system_prompt(prompt);
        self
    }

    // ─── Accessors ──────────────────────────────────────────────────────

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Committed history (never compacted).
    pub fn messages(&self) -> &[Message] {
        self.store.view()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn message_count(&self) -> usize {
        self.store.len()
    }

    /// Every dispatched tool call, including those of failed turns.
    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit_log
    }

    pub fn compaction_state(&self) -> &CompactionState {
        self.compactor.state()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Pin a long-term fact for hierarchical compaction.
    pub fn pin_fact(&mut self, fact: impl Into<String>) {
        self.compactor.pin_fact(fact);
    }

    /// Start over: keep system messages, drop everything else, new id.
    pub fn reset_conversation(&mut self) {
        let previous = std::mem::replace(&mut self.conversation_id, Uuid::new_v4().to_string());
        self.store = self.store.system_only();
        self.compactor.reset();
        self.state = TurnState::AwaitingInput;
        tracing::info!(
            previous = %previous,
            conversation_id = %self.conversation_id,
            "conversation reset"
        );
    }

    // ─── Turn ───────────────────────────────────────────────────────────

    /// Run one user turn to a final answer.
    pub async fn run_turn(&mut self, user_text: &str) -> Result<TurnOutcome, AgentError> {
        let mut working = self.store.clone();

        match self.drive(&mut working, user_text).await {
            Ok(outcome) => {
                self.store = working;
                tracing::info!(
                    conversation_id = %self.conversation_id,
                    tool_rounds = outcome.tool_rounds,
                    messages = self.store.len(),
                    "turn finished"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.state = TurnState::AwaitingInput;
                tracing::warn!(
                    conversation_id = %self.conversation_id,
                    error = %e,
                    "turn aborted, partial turn discarded"
                );
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        working: &mut MessageStore,
        user_text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        self.enter(TurnState::AwaitingInput)?;
        working.append(Message::user(user_text))?;

        let tools = self.router.registry().tool_definitions();
        let mut rounds = 0usize;
        let mut tools_called = Vec::new();

        loop {
            self.enter(TurnState::ModelCall)?;

            let view = self.compactor.compact(working.view()).await;
            tracing::debug!(
                conversation_id = %self.conversation_id,
                round = rounds,
                sent = view.len(),
                stored = working.len(),
                "calling model"
            );
            let request = ModelRequest {
                model: self.config.model.clone(),
                messages: view,
                tools: tools.clone(),
            };
            let response = self.endpoint.complete(request).await.map_err(|source| {
                AgentError::ModelEndpoint {
                    conversation_id: self.conversation_id.clone(),
                    source,
                }
            })?;

            let (content, calls) = match response {
                ModelResponse::ToolCalls { content, calls } if !calls.is_empty() => {
                    (content, calls)
                }
                other => {
                    let answer = other.text().unwrap_or_default().to_string();
                    working.append(Message::assistant(answer.clone()))?;
                    self.enter(TurnState::Finished)?;
                    return Ok(TurnOutcome {
                        answer,
                        tool_rounds: rounds,
                        tools_called,
                    });
                }
            };

            if rounds >= self.config.max_tool_rounds {
                let last_tools = calls.iter().map(|c| c.name.clone()).collect();
                return Err(AgentError::RunawayToolLoop {
                    conversation_id: self.conversation_id.clone(),
                    rounds,
                    last_tools,
                });
            }

            let requests = assign_ids(working, calls);
            tools_called.extend(requests.iter().map(|r| r.name.clone()));
            working.append(Message::assistant_tool_calls(content, requests.clone()))?;

            self.enter(TurnState::DispatchingTools)?;
            let results = self.router.dispatch(&requests).await;
            rounds += 1;

            self.audit_log.extend(
                results
                    .iter()
                    .map(|r| r.to_audit_entry(&self.conversation_id)),
            );
            for result in &results {
                working.append(result.to_message())?;
            }
        }
    }

    /// Enter `next`, honouring a pending cancellation.
    fn enter(&mut self, next: TurnState) -> Result<(), AgentError> {
        if self.cancel.take() {
            return Err(AgentError::Cancelled {
                conversation_id: self.conversation_id.clone(),
            });
        }
        tracing::debug!(
            conversation_id = %self.conversation_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "state transition"
        );
        self.state = next;
        Ok(())
    }
}

/// Keep the model's ids where usable; mint fresh ones for missing ids and
/// ids already used in this conversation or batch.
fn assign_ids(store: &MessageStore, calls: Vec<RawToolCall>) -> Vec<ToolCallRequest> {
    let mut batch: HashSet<String> = HashSet::new();
    calls
        .into_iter()
        .map(|raw| {
            let mut id = assign_call_id(raw.id.as_deref());
            if store.contains_call_id(&id) || batch.contains(&id) {
                tracing::debug!(duplicate = %id, "replacing reused tool call id");
                id = assign_call_id(None);
            }
            batch.insert(id.clone());
            ToolCallRequest {
                id,
                name: raw.name,
                arguments: raw.arguments,
            }
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
