//! Turn, role and context-window message types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Free-form, string-keyed metadata attached to a turn.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Role of a turn in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single immutable turn.
///
/// # Invariants
/// - `agent` is `Some` only for `Role::Assistant` turns. Turns created through
///   [`Turn::assistant`] always carry an agent; imported legacy records may not.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: String,
    agent: Option<AgentId>,
    created_at: DateTime<Utc>,
    metadata: Metadata,
}

impl Turn {
    pub fn user(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            agent: None,
            created_at: Utc::now(),
            metadata,
        }
    }

    pub fn assistant(content: impl Into<String>, agent: AgentId, metadata: Metadata) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            agent: Some(agent),
            created_at: Utc::now(),
            metadata,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            agent: None,
            created_at: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    /// Rebuild a turn from persisted fields. An agent on a non-assistant turn is dropped.
    pub(crate) fn restore(
        role: Role,
        content: String,
        agent: Option<AgentId>,
        created_at: DateTime<Utc>,
        metadata: Metadata,
    ) -> Self {
        let agent = if role == Role::Assistant { agent } else { None };
        Self {
            role,
            content,
            agent,
            created_at,
            metadata,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn agent(&self) -> Option<&AgentId> {
        self.agent.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Agent-facing projection of this turn.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A `{role, content}` pair as sent to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Routing input derived from a conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSummary {
    pub turn_count: usize,
    pub agents_used: BTreeSet<AgentId>,
    pub last_agent: Option<AgentId>,
    /// First 100 characters of the most recent user turn.
    pub last_user_excerpt: Option<String>,
}
