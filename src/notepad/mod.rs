//! Shared notepad: a small attributed note log used to hand long-lived
//! context between agents outside the main conversation.
//!
//! Backends are pluggable. [`Notepad::connect`] prefers the remote document
//! store and falls back to the local JSON file once, at construction time.

mod file;
mod memory;
mod remote;

pub use file::FileNotepad;
pub use memory::InMemoryNotepad;
pub use remote::{RemoteNotepad, RemoteNotepadConfig};

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::util::{parse_timestamp, preview, short_id};

pub const NOTES_FILE: &str = "shared_notes.json";
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum NotepadError {
    #[error("Notepad storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Notepad serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote notepad request failed: {0}")]
    Remote(String),
}

/// A single note. Content is immutable; editing is delete plus write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub content: String,
    #[serde(default = "unknown_author")]
    pub author: String,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

fn unknown_author() -> String {
    "unknown".to_string()
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp).unwrap_or_else(Utc::now))
}

/// Listing entry with a content preview instead of the full content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteSummary {
    pub id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub preview: String,
}

impl From<&Note> for NoteSummary {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            author: note.author.clone(),
            created_at: note.created_at,
            tags: note.tags.clone(),
            preview: preview(&note.content, PREVIEW_CHARS),
        }
    }
}

/// Listing filter. A note matches when it has any of `tags` (if given) and
/// was written by `author` (if given). `limit` applies after filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteFilter {
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub limit: usize,
}

impl Default for NoteFilter {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            author: None,
            limit: 20,
        }
    }
}

impl NoteFilter {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        if let Some(author) = &self.author {
            if &note.author != author {
                return false;
            }
        }
        self.tags.is_empty() || self.tags.iter().any(|t| note.tags.contains(t))
    }
}

/// Storage contract shared by every notepad backend. Notes are kept
/// most-recent-first.
#[async_trait]
pub trait NotepadBackend: Send + Sync {
    /// Short backend name for logs and status output.
    fn kind(&self) -> &'static str;

    /// Whether notes survive a restart.
    fn is_persistent(&self) -> bool;

    /// Store `note` as the most recent note, replacing any note with the same id.
    async fn put(&self, note: Note) -> Result<(), NotepadError>;

    async fn get(&self, id: &str) -> Result<Option<Note>, NotepadError>;

    async fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>, NotepadError>;

    /// Returns whether a note was removed.
    async fn remove(&self, id: &str) -> Result<bool, NotepadError>;

    async fn clear(&self) -> Result<(), NotepadError>;
}

/// Replace-by-id insert at the front.
pub(crate) fn put_front(notes: &mut Vec<Note>, note: Note) {
    notes.retain(|n| n.id != note.id);
    notes.insert(0, note);
}

pub(crate) fn filter_notes(notes: &[Note], filter: &NoteFilter) -> Vec<Note> {
    notes
        .iter()
        .filter(|n| filter.matches(n))
        .take(filter.limit)
        .cloned()
        .collect()
}

/// Where the notepad lives.
#[derive(Debug, Clone)]
pub struct NotepadConfig {
    /// Directory holding the local notes file.
    pub root: PathBuf,
    /// Author recorded on notes written through this instance.
    pub author: String,
    pub remote: Option<RemoteNotepadConfig>,
}

/// Notepad front end bound to one backend and one author.
#[derive(Clone)]
pub struct Notepad {
    backend: Arc<dyn NotepadBackend>,
    author: String,
}

impl Notepad {
    pub fn with_backend(backend: Arc<dyn NotepadBackend>, author: impl Into<String>) -> Self {
        Self {
            backend,
            author: author.into(),
        }
    }

    pub fn in_memory(author: impl Into<String>) -> Self {
        Self::with_backend(Arc::new(InMemoryNotepad::new()), author)
    }

    pub async fn local(root: PathBuf, author: impl Into<String>) -> Result<Self, NotepadError> {
        let backend = FileNotepad::open(root.join(NOTES_FILE)).await?;
        Ok(Self::with_backend(Arc::new(backend), author))
    }

    /// Open the configured notepad.
    ///
    /// When a remote backend is configured it is probed once; if the probe
    /// fails the local file backend is used for the lifetime of this instance.
    pub async fn connect(config: &NotepadConfig) -> Result<Self, NotepadError> {
        if let Some(remote_config) = &config.remote {
            let remote = RemoteNotepad::new(remote_config.clone());
            match remote.probe().await {
                Ok(()) => match remote.ensure_collection().await {
                    Ok(()) => {
                        tracing::info!(url = %remote_config.base_url, "Using remote notepad");
                        return Ok(Self::with_backend(Arc::new(remote), config.author.clone()));
                    }
                    Err(e) => tracing::debug!("Remote notepad collection unavailable: {}", e),
                },
                Err(e) => tracing::debug!("Remote notepad not reachable: {}", e),
            }
        }

        let notepad = Self::local(config.root.clone(), config.author.clone()).await?;
        tracing::debug!(root = %config.root.display(), "Using local notepad");
        Ok(notepad)
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    /// Write a note and return its id. Without `id` a short random id is
    /// generated; an existing note with the same id is replaced.
    pub async fn write<I, S>(
        &self,
        content: &str,
        id: Option<&str>,
        tags: I,
    ) -> Result<String, NotepadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let note = Note {
            id: id.map(str::to_string).unwrap_or_else(short_id),
            content: content.to_string(),
            author: self.author.clone(),
            created_at: Utc::now(),
            tags: tags.into_iter().map(Into::into).collect(),
        };
        let id = note.id.clone();
        self.backend.put(note).await?;
        tracing::info!(note_id = %id, author = %self.author, "Wrote note");
        Ok(id)
    }

    pub async fn read(&self, id: &str) -> Result<Option<String>, NotepadError> {
        Ok(self.backend.get(id).await?.map(|note| note.content))
    }

    pub async fn list(&self, filter: &NoteFilter) -> Result<Vec<NoteSummary>, NotepadError> {
        let notes = self.backend.list(filter).await?;
        Ok(notes.iter().map(NoteSummary::from).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<bool, NotepadError> {
        let removed = self.backend.remove(id).await?;
        if removed {
            tracing::info!(note_id = %id, "Deleted note");
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<(), NotepadError> {
        self.backend.clear().await
    }

    /// Render the most recent notes as a prompt block. Empty when there are
    /// no notes.
    pub async fn format_for_prompt(&self, limit: usize) -> Result<String, NotepadError> {
        let notes = self.list(&NoteFilter::recent(limit)).await?;
        if notes.is_empty() {
            return Ok(String::new());
        }

        let mut lines = vec![
            "## Shared Notepad Context".to_string(),
            "Recent notes from shared memory:".to_string(),
            String::new(),
        ];
        for note in &notes {
            lines.push(format!("[{}] ({}): {}", note.author, note.id, note.preview));
        }
        lines.push(String::new());
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_write_wins_and_delete_removes() {
        let notepad = Notepad::in_memory("tester");
        notepad.write("x", Some("a"), ["t"]).await.unwrap();
        notepad.write("y", Some("a"), Vec::<String>::new()).await.unwrap();

        assert_eq!(notepad.read("a").await.unwrap().as_deref(), Some("y"));
        assert_eq!(notepad.list(&NoteFilter::default()).await.unwrap().len(), 1);

        assert!(notepad.delete("a").await.unwrap());
        assert_eq!(notepad.read("a").await.unwrap(), None);
        assert!(!notepad.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn generated_ids_are_short_and_listing_is_most_recent_first() {
        let notepad = Notepad::in_memory("tester");
        let first = notepad.write("first", None, Vec::<String>::new()).await.unwrap();
        let second = notepad.write("second", None, Vec::<String>::new()).await.unwrap();
        assert_eq!(first.len(), 8);
        assert_ne!(first, second);

        let ids: Vec<String> = notepad
            .list(&NoteFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn list_filters_before_limiting() {
        let notepad = Notepad::in_memory("tester");
        notepad.write("tagged", Some("old"), ["plan"]).await.unwrap();
        for i in 0..5 {
            notepad
                .write(&format!("untagged {i}"), None, Vec::<String>::new())
                .await
                .unwrap();
        }

        let filter = NoteFilter {
            tags: vec!["plan".to_string(), "other".to_string()],
            author: None,
            limit: 2,
        };
        let listed = notepad.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "old");

        let by_author = NoteFilter {
            author: Some("someone-else".to_string()),
            ..NoteFilter::default()
        };
        assert!(notepad.list(&by_author).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_preview_is_truncated() {
        let notepad = Notepad::in_memory("tester");
        notepad.write(&"n".repeat(150), Some("long"), Vec::<String>::new()).await.unwrap();
        let listed = notepad.list(&NoteFilter::default()).await.unwrap();
        assert_eq!(listed[0].preview.len(), 103);
        assert!(listed[0].preview.ends_with("..."));
    }

    #[tokio::test]
    async fn prompt_block_lists_recent_notes() {
        let notepad = Notepad::in_memory("senior");
        assert_eq!(notepad.format_for_prompt(5).await.unwrap(), "");

        notepad.write("use tokio", Some("n1"), Vec::<String>::new()).await.unwrap();
        let block = notepad.format_for_prompt(5).await.unwrap();
        assert!(block.starts_with("## Shared Notepad Context\n"));
        assert!(block.contains("[senior] (n1): use tokio"));
    }

    #[tokio::test]
    async fn connect_falls_back_to_local_when_remote_is_down() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = NotepadConfig {
            root: dir.path().to_path_buf(),
            author: "orchestrator".to_string(),
            remote: Some(RemoteNotepadConfig {
                base_url: format!("http://{}", addr),
                ..RemoteNotepadConfig::default()
            }),
        };

        let notepad = Notepad::connect(&config).await.unwrap();
        assert_eq!(notepad.backend_kind(), "file");
        notepad.write("persisted", Some("p"), Vec::<String>::new()).await.unwrap();
        assert!(dir.path().join(NOTES_FILE).exists());
    }

    #[tokio::test]
    async fn local_notepads_share_notes_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Notepad::local(dir.path().to_path_buf(), "orchestrator")
            .await
            .unwrap();
        let senior = Notepad::local(dir.path().to_path_buf(), "claude").await.unwrap();

        senior.write("use tabs", Some("plan"), ["style"]).await.unwrap();
        let block = orchestrator.format_for_prompt(5).await.unwrap();
        assert!(block.contains("[claude] (plan): use tabs"));

        orchestrator
            .write("from the user", Some("u1"), ["user"])
            .await
            .unwrap();
        assert_eq!(senior.read("plan").await.unwrap().as_deref(), Some("use tabs"));
        assert_eq!(senior.list(&NoteFilter::default()).await.unwrap().len(), 2);
    }

    #[test]
    fn legacy_note_records_deserialize() {
        let note: Note = serde_json::from_str(
            r#"{"id":"ab12cd34","content":"hi","created_at":"2024-05-01T09:30:00.123456","tags":["user","user"]}"#,
        )
        .unwrap();
        assert_eq!(note.author, "unknown");
        assert_eq!(note.tags.len(), 1);
        assert_eq!(note.created_at.format("%H:%M").to_string(), "09:30");
    }
}
