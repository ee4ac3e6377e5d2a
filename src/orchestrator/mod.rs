//! Orchestrator: routes each message to an agent, records the exchange, and
//! follows agent-to-agent handoffs up to a hop bound.
//!
//! ```text
//!   message ──► Router ──► resolve (fallback) ──► Conversation (user turn)
//!                                                      │
//!                               context window ◄───────┘
//!                                     │
//!                               AgentHandle::invoke_stream
//!                                     │
//!            Conversation (assistant turn) ◄── Complete
//!                                     │
//!            directive? ──► next hop   junior reply? ──► back to senior
//! ```
//!
//! The orchestrator owns its conversation; every mutation goes through
//! `&mut self`, so one turn is in flight at a time.

mod events;

pub use events::OrchestratorEvent;

use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{
    AgentError, AgentEvent, AgentHandle, AgentId, AgentInfo, AgentRegistry, AgentRole,
};
use crate::conversation::{ChatMessage, Conversation, ConversationError, Metadata, Role};
use crate::handoff::{Directive, DirectiveParser};
use crate::notepad::Notepad;
use crate::prompts;
use crate::router::{DirectiveTokens, Router, RoutingDecision};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No agents available")]
    NoAgentsAvailable,

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Hop {hop}: agent {agent} failed: {source}")]
    Invocation {
        hop: usize,
        agent: AgentId,
        #[source]
        source: AgentError,
    },

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Invalid directive tokens: {0}")]
    Directives(#[from] regex::Error),

    #[error(transparent)]
    Session(#[from] ConversationError),
}

/// Hop bound, context window sizes, and prompt settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum agent invocations per `process_message`.
    pub max_hops: usize,
    pub senior_context_turns: usize,
    pub junior_context_turns: usize,
    /// Optional character budget for junior context windows.
    pub junior_context_chars: Option<usize>,
    /// Prepend recent notepad notes to messages sent to junior agents.
    pub inject_notes: bool,
    pub note_context_limit: usize,
    pub tokens: DirectiveTokens,
    /// Overrides for the default role prompts.
    pub senior_prompt: Option<String>,
    pub junior_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_hops: 5,
            senior_context_turns: 50,
            junior_context_turns: 20,
            junior_context_chars: None,
            inject_notes: true,
            note_context_limit: 5,
            tokens: DirectiveTokens::default(),
            senior_prompt: None,
            junior_prompt: None,
        }
    }
}

/// One completed hop of `process_message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopRecord {
    pub hop: usize,
    /// Agent that produced the reply (after any fallback).
    pub agent: AgentId,
    pub role: AgentRole,
    pub reason: String,
    /// Reply with any trailing directive stripped.
    pub reply: String,
    #[serde(skip)]
    pub directive: Option<Directive>,
    pub auto_bounced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// A senior reply without a directive ended the chain.
    Completed,
    /// The hop bound was reached; `pending` is the message that was not sent.
    MaxHops { pending: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessReport {
    pub hops: Vec<HopRecord>,
    pub outcome: ProcessOutcome,
}

impl ProcessReport {
    pub fn hit_max_hops(&self) -> bool {
        matches!(self.outcome, ProcessOutcome::MaxHops { .. })
    }
}

/// Everything needed to invoke an agent for one hop.
struct PreparedHop {
    hop: usize,
    agent: Arc<dyn AgentHandle>,
    reason: String,
    /// Routed target was senior but another agent answered.
    fell_back_from_senior: bool,
    message: String,
    history: Vec<ChatMessage>,
    system_prompt: String,
}

struct HopReply {
    agent: Arc<dyn AgentHandle>,
    reason: String,
    fell_back_from_senior: bool,
    reply: String,
}

enum HopItem {
    Delta(String),
    Done(HopReply),
}

/// Aborts the agent's stream task when the hop ends or is dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    agents: AgentRegistry,
    conversation: Option<Conversation>,
    turn_limit: usize,
    notepad: Option<Notepad>,
    cancel: Option<CancellationToken>,
}

impl OrchestratorBuilder {
    /// Register an agent. Registration order is fallback order.
    pub fn agent(mut self, agent: Arc<dyn AgentHandle>) -> Self {
        self.agents.register(agent);
        self
    }

    /// Continue an existing (e.g. imported) conversation.
    pub fn conversation(mut self, conversation: Conversation) -> Self {
        self.conversation = Some(conversation);
        self
    }

    pub fn turn_limit(mut self, turn_limit: usize) -> Self {
        self.turn_limit = turn_limit;
        self
    }

    pub fn notepad(mut self, notepad: Notepad) -> Self {
        self.notepad = Some(notepad);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let senior = self
            .agents
            .first_with_role(AgentRole::Senior)
            .map(|a| a.id().clone())
            .unwrap_or_else(|| AgentId::new("senior"));
        let junior = self
            .agents
            .first_with_role(AgentRole::Junior)
            .map(|a| a.id().clone())
            .unwrap_or_else(|| AgentId::new("junior"));

        let tokens = self.config.tokens.clone();
        let directives = DirectiveParser::new(tokens.clone())?;
        let senior_prompt = self
            .config
            .senior_prompt
            .clone()
            .unwrap_or_else(|| prompts::senior_prompt(&tokens));
        let junior_prompt = self
            .config
            .junior_prompt
            .clone()
            .unwrap_or_else(|| prompts::junior_prompt(&tokens));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(
            senior = %senior,
            junior = %junior,
            agents = self.agents.len(),
            max_hops = self.config.max_hops,
            "Built orchestrator"
        );

        Ok(Orchestrator {
            router: Router::with_tokens(senior, junior, tokens),
            directives,
            agents: self.agents,
            conversation: self
                .conversation
                .unwrap_or_else(|| Conversation::new(self.turn_limit)),
            notepad: self.notepad,
            events,
            cancel: self.cancel,
            current_agent: None,
            senior_prompt,
            junior_prompt,
            config: self.config,
        })
    }
}

pub struct Orchestrator {
    agents: AgentRegistry,
    router: Router,
    directives: DirectiveParser,
    conversation: Conversation,
    notepad: Option<Notepad>,
    events: broadcast::Sender<OrchestratorEvent>,
    cancel: Option<CancellationToken>,
    current_agent: Option<AgentId>,
    senior_prompt: String,
    junior_prompt: String,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            agents: AgentRegistry::new(),
            conversation: None,
            turn_limit: Conversation::DEFAULT_TURN_LIMIT,
            notepad: None,
            cancel: None,
        }
    }

    /// Subscribe to progress events for subsequent turns.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Replace the cancellation token checked while a hop streams.
    pub fn set_cancellation(&mut self, token: Option<CancellationToken>) {
        self.cancel = token;
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn notepad(&self) -> Option<&Notepad> {
        self.notepad.as_ref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Probe every registered agent.
    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.list().await
    }

    /// Agent that produced the last committed reply.
    pub fn current_agent(&self) -> Option<&AgentId> {
        self.current_agent.as_ref()
    }

    pub fn clear_conversation(&mut self, keep_system: bool) {
        self.conversation.clear(keep_system);
        tracing::info!(keep_system, "Cleared conversation");
    }

    pub async fn export_session(&self, path: impl AsRef<Path>) -> Result<(), OrchestratorError> {
        self.conversation.export(path).await?;
        Ok(())
    }

    /// Independent copy of the conversation under a derived session id.
    pub fn fork(&self) -> Conversation {
        self.conversation.fork()
    }

    /// Send one message to one agent and return its complete reply.
    ///
    /// `forced` bypasses routing but still falls back when that agent is
    /// unavailable. Directives in the reply are not followed.
    pub async fn chat(
        &mut self,
        message: &str,
        forced: Option<&AgentId>,
    ) -> Result<String, OrchestratorError> {
        Ok(self.run_hop(1, message, forced).await?.reply)
    }

    /// Streaming counterpart of [`Orchestrator::chat`], yielding text as it
    /// arrives. The assistant turn is recorded only once the agent completes;
    /// dropping the stream early records nothing.
    pub fn chat_stream<'a>(
        &'a mut self,
        message: &'a str,
        forced: Option<&'a AgentId>,
    ) -> impl Stream<Item = Result<String, OrchestratorError>> + 'a {
        self.hop_stream(1, message, forced).filter_map(|item| {
            futures::future::ready(match item {
                Ok(HopItem::Delta(text)) => Some(Ok(text)),
                Ok(HopItem::Done(_)) => None,
                Err(e) => Some(Err(e)),
            })
        })
    }

    /// Run a message through the handoff loop.
    ///
    /// Each hop routes the current message, records the reply, and then:
    /// a trailing directive becomes the next message; a junior reply without
    /// one is sent back to the senior agent; a senior reply without one ends
    /// the chain. At most `max_hops` agents are invoked.
    pub async fn process_message(
        &mut self,
        message: &str,
    ) -> Result<ProcessReport, OrchestratorError> {
        let max_hops = self.config.max_hops.max(1);
        let mut hops: Vec<HopRecord> = Vec::new();
        let mut current = message.to_string();

        loop {
            let hop = hops.len() + 1;
            let reply = self.run_hop(hop, &current, None).await?;
            let (clean, directive) = self.directives.extract(&reply.reply);
            let clean = clean.to_string();
            let agent_id = reply.agent.id().clone();
            let role = reply.agent.role();

            self.emit(OrchestratorEvent::Reply {
                hop,
                agent: agent_id.clone(),
                content: clean.clone(),
            });

            let mut auto_bounced = false;
            let next = match &directive {
                Some(directive) => {
                    tracing::info!(
                        hop,
                        from = %agent_id,
                        target = %directive.target,
                        "Agent handoff"
                    );
                    self.emit(OrchestratorEvent::Handoff {
                        hop,
                        from: agent_id.clone(),
                        target: directive.target,
                        command: directive.command.clone(),
                    });
                    Some(directive.command.clone())
                }
                None if role == AgentRole::Junior && !reply.fell_back_from_senior => {
                    tracing::info!(hop, from = %agent_id, "Returning junior reply to senior");
                    self.emit(OrchestratorEvent::AutoBounce {
                        hop,
                        from: agent_id.clone(),
                    });
                    auto_bounced = true;
                    Some(format!(
                        "{} The junior agent responded:\n\n{}",
                        self.router.tokens().senior_address(),
                        clean
                    ))
                }
                None => None,
            };

            hops.push(HopRecord {
                hop,
                agent: agent_id,
                role,
                reason: reply.reason,
                reply: clean,
                directive,
                auto_bounced,
            });

            match next {
                None => {
                    return Ok(ProcessReport {
                        hops,
                        outcome: ProcessOutcome::Completed,
                    })
                }
                Some(pending) if hops.len() >= max_hops => {
                    tracing::warn!(hops = hops.len(), "Maximum agent hops reached, stopping chain");
                    self.emit(OrchestratorEvent::MaxHops { hops: hops.len() });
                    return Ok(ProcessReport {
                        hops,
                        outcome: ProcessOutcome::MaxHops { pending },
                    });
                }
                Some(pending) => current = pending,
            }
        }
    }

    async fn run_hop(
        &mut self,
        hop: usize,
        message: &str,
        forced: Option<&AgentId>,
    ) -> Result<HopReply, OrchestratorError> {
        let stream = self.hop_stream(hop, message, forced);
        futures::pin_mut!(stream);
        while let Some(item) = stream.next().await {
            if let HopItem::Done(reply) = item? {
                return Ok(reply);
            }
        }
        Err(OrchestratorError::Cancelled)
    }

    /// One hop: route, record the user turn, stream the reply, and record
    /// the assistant turn on completion.
    fn hop_stream<'a>(
        &'a mut self,
        hop: usize,
        message: &'a str,
        forced: Option<&'a AgentId>,
    ) -> impl Stream<Item = Result<HopItem, OrchestratorError>> + 'a {
        async_stream::stream! {
            let prepared = match self.prepare_hop(hop, message, forced).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let agent_id = prepared.agent.id().clone();
            let invocation_error = |source: AgentError| OrchestratorError::Invocation {
                hop,
                agent: agent_id.clone(),
                source,
            };

            let started = prepared
                .agent
                .invoke_stream(
                    &prepared.message,
                    &prepared.history,
                    Some(&prepared.system_prompt),
                )
                .await;
            let (mut rx, handle) = match started {
                Ok(started) => started,
                Err(source) => {
                    tracing::error!(hop, agent = %agent_id, "Agent failed to start: {}", source);
                    yield Err(invocation_error(source));
                    return;
                }
            };
            let _task = AbortOnDrop(handle);

            let mut reply = String::new();
            loop {
                let event = match next_event(self.cancel.as_ref(), &mut rx).await {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(hop, agent = %agent_id, "Hop cancelled");
                        yield Err(e);
                        return;
                    }
                };
                match event {
                    Some(AgentEvent::TextDelta { content }) => {
                        reply.push_str(&content);
                        self.emit(OrchestratorEvent::TextDelta {
                            hop,
                            agent: agent_id.clone(),
                            content: content.clone(),
                        });
                        yield Ok(HopItem::Delta(content));
                    }
                    Some(AgentEvent::Complete) => break,
                    Some(AgentEvent::Error { message }) => {
                        tracing::error!(hop, agent = %agent_id, "Agent failed: {}", message);
                        yield Err(invocation_error(AgentError::Failed(message)));
                        return;
                    }
                    None => {
                        tracing::error!(hop, agent = %agent_id, "Agent stream ended without completing");
                        yield Err(invocation_error(AgentError::Interrupted));
                        return;
                    }
                }
            }

            let mut metadata = Metadata::new();
            metadata.insert("hop".to_string(), json!(hop));
            self.conversation
                .add_assistant(reply.clone(), agent_id.clone(), metadata);
            self.current_agent = Some(agent_id);

            yield Ok(HopItem::Done(HopReply {
                agent: prepared.agent,
                reason: prepared.reason,
                fell_back_from_senior: prepared.fell_back_from_senior,
                reply,
            }));
        }
    }

    async fn prepare_hop(
        &mut self,
        hop: usize,
        message: &str,
        forced: Option<&AgentId>,
    ) -> Result<PreparedHop, OrchestratorError> {
        let decision = match forced {
            Some(id) => {
                if self.agents.get(id).is_none() {
                    return Err(OrchestratorError::UnknownAgent(id.clone()));
                }
                RoutingDecision {
                    target: id.clone(),
                    reason: "forced by caller".to_string(),
                }
            }
            None => self.router.route(message, &self.conversation.summary()),
        };

        let agent = self.resolve(&decision.target).await?;
        let fallback = agent.id() != &decision.target;
        let fell_back_from_senior = fallback
            && self
                .agents
                .get(&decision.target)
                .map_or(decision.target == *self.router.senior(), |a| {
                    a.role() == AgentRole::Senior
                });

        tracing::info!(
            hop,
            agent = %agent.id(),
            reason = %decision.reason,
            fallback,
            "Routing message"
        );
        self.emit(OrchestratorEvent::Routed {
            hop,
            agent: agent.id().clone(),
            reason: decision.reason.clone(),
            fallback,
        });

        let mut metadata = Metadata::new();
        metadata.insert("routing_reason".to_string(), json!(decision.reason));
        if fallback {
            metadata.insert("fallback_from".to_string(), json!(decision.target.as_str()));
        }
        self.conversation.add_user(message, metadata);

        let role = agent.role();
        let (max_turns, max_chars) = match role {
            AgentRole::Senior => (self.config.senior_context_turns, None),
            AgentRole::Junior => (
                self.config.junior_context_turns,
                self.config.junior_context_chars,
            ),
        };
        let mut history = self
            .conversation
            .context_for(agent.id(), Some(max_turns), max_chars);
        // The current message is passed separately.
        if history
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == message)
        {
            history.pop();
        }

        let (message, system_prompt) = match role {
            AgentRole::Senior => (message.to_string(), self.senior_prompt.clone()),
            AgentRole::Junior => (
                self.with_note_context(message).await,
                self.junior_prompt.clone(),
            ),
        };

        Ok(PreparedHop {
            hop,
            agent,
            reason: decision.reason,
            fell_back_from_senior,
            message,
            history,
            system_prompt,
        })
    }

    /// The target if it is available, otherwise the first available agent in
    /// registration order.
    async fn resolve(&self, target: &AgentId) -> Result<Arc<dyn AgentHandle>, OrchestratorError> {
        if let Some(agent) = self.agents.get(target) {
            if agent.available().await {
                return Ok(agent);
            }
        }
        for agent in self.agents.iter() {
            if agent.id() != target && agent.available().await {
                tracing::warn!(
                    "Agent {} unavailable, falling back to {}",
                    target,
                    agent.id()
                );
                return Ok(Arc::clone(agent));
            }
        }
        Err(OrchestratorError::NoAgentsAvailable)
    }

    async fn with_note_context(&self, message: &str) -> String {
        let Some(notepad) = self.notepad.as_ref().filter(|_| self.config.inject_notes) else {
            return message.to_string();
        };
        match notepad.format_for_prompt(self.config.note_context_limit).await {
            Ok(context) if !context.is_empty() => format!("{}\n---\n\n{}", context, message),
            Ok(_) => message.to_string(),
            Err(e) => {
                tracing::warn!("Skipping notepad context: {}", e);
                message.to_string()
            }
        }
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Next agent event, or `Cancelled` once the token fires.
async fn next_event(
    cancel: Option<&CancellationToken>,
    rx: &mut mpsc::Receiver<AgentEvent>,
) -> Result<Option<AgentEvent>, OrchestratorError> {
    match cancel {
        Some(token) => tokio::select! {
            _ = token.cancelled() => Err(OrchestratorError::Cancelled),
            event = rx.recv() => Ok(event),
        },
        None => Ok(rx.recv().await),
    }
}
