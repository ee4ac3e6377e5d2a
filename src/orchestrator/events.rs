use serde::Serialize;

use crate::agent::{AgentId, AgentRole};

/// Progress of a turn, published on the orchestrator's broadcast feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A hop was assigned to an agent. `fallback` is set when the routed
    /// target was unavailable and another agent took over.
    Routed {
        hop: usize,
        agent: AgentId,
        reason: String,
        fallback: bool,
    },
    /// Text content being streamed.
    TextDelta {
        hop: usize,
        agent: AgentId,
        content: String,
    },
    /// A hop finished; `content` has any trailing directive stripped.
    Reply {
        hop: usize,
        agent: AgentId,
        content: String,
    },
    /// The reply ended with a directive that becomes the next message.
    Handoff {
        hop: usize,
        from: AgentId,
        target: AgentRole,
        command: String,
    },
    /// A junior reply was sent back to the senior agent for review.
    AutoBounce { hop: usize, from: AgentId },
    /// The hop bound stopped a chain that still had a pending message.
    MaxHops { hops: usize },
}

impl OrchestratorEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            OrchestratorEvent::Routed { .. } => "routed",
            OrchestratorEvent::TextDelta { .. } => "text_delta",
            OrchestratorEvent::Reply { .. } => "reply",
            OrchestratorEvent::Handoff { .. } => "handoff",
            OrchestratorEvent::AutoBounce { .. } => "auto_bounce",
            OrchestratorEvent::MaxHops { .. } => "max_hops",
        }
    }
}
