//! Core types for the agent layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::openai::HttpError;

/// Identifier of a registered agent (e.g. `"claude-code"`, `"local-model"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Class of an agent. Senior agents get larger context windows and review
/// everything a junior agent produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Senior,
    Junior,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Senior => write!(f, "senior"),
            Self::Junior => write!(f, "junior"),
        }
    }
}

/// Errors raised by an agent handle while serving a single call.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Failed to start agent process: {0}")]
    Spawn(String),

    #[error("Agent call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Agent reported an error: {0}")]
    Failed(String),

    #[error("Agent stream ended before completion")]
    Interrupted,
}
