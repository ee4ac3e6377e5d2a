//! Session export and import.
//!
//! File format:
//! `{session_id, exported_at, message_count, turn_limit, messages: [{role, content, agent, timestamp, metadata}]}`

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::fs;

use super::{Conversation, Metadata, Role, Turn};
use crate::agent::AgentId;
use crate::util::parse_timestamp;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Session file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed session file: {0}")]
    Format(String),
}

#[derive(Debug, Serialize)]
struct SessionExport<'a> {
    session_id: &'a str,
    exported_at: DateTime<Utc>,
    message_count: usize,
    turn_limit: usize,
    messages: Vec<TurnRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TurnRecord {
    role: Role,
    content: String,
    #[serde(default)]
    agent: Option<AgentId>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

impl From<&Turn> for TurnRecord {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role(),
            content: turn.content().to_string(),
            agent: turn.agent().cloned(),
            timestamp: Some(turn.created_at().to_rfc3339()),
            metadata: turn.metadata().clone(),
        }
    }
}

impl TurnRecord {
    fn into_turn(self) -> Turn {
        let created_at = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        Turn::restore(self.role, self.content, self.agent, created_at, self.metadata)
    }
}

impl Conversation {
    /// Serialize the session to the export JSON document.
    pub fn to_export_json(&self) -> Result<String, ConversationError> {
        let export = SessionExport {
            session_id: &self.session_id,
            exported_at: Utc::now(),
            message_count: self.turns.len(),
            turn_limit: self.turn_limit,
            messages: self.turns.iter().map(TurnRecord::from).collect(),
        };
        serde_json::to_string_pretty(&export).map_err(|e| ConversationError::Format(e.to_string()))
    }

    /// Rebuild a conversation from an export JSON document.
    ///
    /// Individual message records that fail to parse are skipped with a
    /// warning. A missing `session_id` yields a fresh one; a missing
    /// `turn_limit` yields the default.
    pub fn from_export_json(raw: &str) -> Result<Conversation, ConversationError> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| ConversationError::Format(e.to_string()))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| ConversationError::Format("expected a JSON object".to_string()))?;

        let turn_limit = obj
            .get("turn_limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(Self::DEFAULT_TURN_LIMIT);

        let mut conversation = match obj.get("session_id").and_then(Value::as_str) {
            Some(id) => Conversation::with_session_id(id, turn_limit),
            None => Conversation::new(turn_limit),
        };

        let messages: &[Value] = match obj.get("messages") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(ConversationError::Format(
                    "`messages` must be an array".to_string(),
                ))
            }
            None => &[],
        };

        for (index, item) in messages.iter().enumerate() {
            match serde_json::from_value::<TurnRecord>(item.clone()) {
                Ok(record) => conversation.turns.push(record.into_turn()),
                Err(e) => {
                    tracing::warn!(index, "Skipping malformed session message: {}", e);
                }
            }
        }
        conversation.trim();

        Ok(conversation)
    }

    /// Write the session to `path`, creating parent directories.
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<(), ConversationError> {
        let path = path.as_ref();
        let data = self.to_export_json()?;
        let io_err = |source| ConversationError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, data).await.map_err(io_err)?;
        fs::rename(&tmp_path, path).await.map_err(io_err)?;

        tracing::info!(
            session_id = %self.session_id,
            path = %path.display(),
            turns = self.turns.len(),
            "Exported session"
        );
        Ok(())
    }

    /// Read a session previously written by [`Conversation::export`].
    pub async fn import(path: impl AsRef<Path>) -> Result<Conversation, ConversationError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .map_err(|source| ConversationError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let conversation = Self::from_export_json(&raw)?;
        tracing::info!(
            session_id = %conversation.session_id,
            path = %path.display(),
            turns = conversation.turns.len(),
            "Imported session"
        );
        Ok(conversation)
    }
}
