//! JSON file notepad backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::{filter_notes, put_front, Note, NoteFilter, NotepadBackend, NotepadError};

/// Notes stored as a most-recent-first JSON array in a single file.
///
/// The file is the source of truth: every operation reloads it, so notes
/// written by another process (the notepad MCP server) are seen here and
/// are not overwritten by a stale snapshot.
#[derive(Clone)]
pub struct FileNotepad {
    path: PathBuf,
    persist_lock: Arc<Mutex<()>>,
}

impl FileNotepad {
    /// Open (or lazily create) the notes file at `path`.
    ///
    /// A file that cannot be parsed is treated as empty and will be
    /// overwritten on the next write.
    pub async fn open(path: PathBuf) -> Result<Self, NotepadError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            persist_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Vec<Note> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<Note>>(&bytes) {
                Ok(notes) => notes,
                Err(e) => {
                    tracing::warn!("Failed to parse notepad {}: {}", self.path.display(), e);
                    Vec::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                tracing::warn!("Failed to read notepad {}: {}", self.path.display(), err);
                Vec::new()
            }
        }
    }

    async fn persist(&self, notes: &[Note]) -> Result<(), NotepadError> {
        let data = serde_json::to_vec_pretty(notes)?;
        let tmp_path = self.path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Reload, apply `change`, and write back when it reports a modification.
    async fn update<R>(
        &self,
        change: impl FnOnce(&mut Vec<Note>) -> (R, bool),
    ) -> Result<R, NotepadError> {
        let _guard = self.persist_lock.lock().await;
        let mut notes = self.load().await;
        let (result, modified) = change(&mut notes);
        if modified {
            self.persist(&notes).await?;
        }
        Ok(result)
    }
}

#[async_trait]
impl NotepadBackend for FileNotepad {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn is_persistent(&self) -> bool {
        true
    }

    async fn put(&self, note: Note) -> Result<(), NotepadError> {
        self.update(|notes| {
            put_front(notes, note);
            ((), true)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, NotepadError> {
        Ok(self.load().await.into_iter().find(|n| n.id == id))
    }

    async fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>, NotepadError> {
        Ok(filter_notes(&self.load().await, filter))
    }

    async fn remove(&self, id: &str) -> Result<bool, NotepadError> {
        self.update(|notes| {
            let before = notes.len();
            notes.retain(|n| n.id != id);
            let removed = notes.len() != before;
            (removed, removed)
        })
        .await
    }

    async fn clear(&self) -> Result<(), NotepadError> {
        self.update(|notes| {
            notes.clear();
            ((), true)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn note(id: &str, content: &str) -> Note {
        Note {
            id: id.to_string(),
            content: content.to_string(),
            author: "tester".to_string(),
            created_at: Utc::now(),
            tags: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn notes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared_notes.json");

        let store = FileNotepad::open(path.clone()).await.unwrap();
        store.put(note("a", "first")).await.unwrap();
        store.put(note("b", "second")).await.unwrap();
        assert!(store.remove("a").await.unwrap());

        let reopened = FileNotepad::open(path.clone()).await.unwrap();
        let notes = reopened.list(&NoteFilter::default()).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "second");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared_notes.json");
        fs::write(&path, b"{not json").await.unwrap();

        let store = FileNotepad::open(path.clone()).await.unwrap();
        assert!(store.list(&NoteFilter::default()).await.unwrap().is_empty());

        store.put(note("fresh", "ok")).await.unwrap();
        let raw = fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"fresh\""));
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shared_notes.json");
        let store = FileNotepad::open(path.clone()).await.unwrap();
        store.put(note("x", "y")).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn clear_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared_notes.json");
        let store = FileNotepad::open(path.clone()).await.unwrap();
        store.put(note("x", "y")).await.unwrap();
        store.clear().await.unwrap();

        let reopened = FileNotepad::open(path).await.unwrap();
        assert!(reopened.get("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn instances_on_one_file_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared_notes.json");
        let repl = FileNotepad::open(path.clone()).await.unwrap();
        let server = FileNotepad::open(path.clone()).await.unwrap();

        server.put(note("plan", "use tabs")).await.unwrap();
        assert_eq!(repl.get("plan").await.unwrap().unwrap().content, "use tabs");

        repl.put(note("u1", "from the user")).await.unwrap();
        let ids: Vec<String> = FileNotepad::open(path)
            .await
            .unwrap()
            .list(&NoteFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec!["u1", "plan"]);

        assert!(server.remove("u1").await.unwrap());
        assert!(repl.get("u1").await.unwrap().is_none());
    }
}
