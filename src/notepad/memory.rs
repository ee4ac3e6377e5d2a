//! In-memory notepad backend (non-persistent).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{filter_notes, put_front, Note, NoteFilter, NotepadBackend, NotepadError};

#[derive(Clone)]
pub struct InMemoryNotepad {
    notes: Arc<RwLock<Vec<Note>>>,
}

impl InMemoryNotepad {
    pub fn new() -> Self {
        Self {
            notes: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryNotepad {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotepadBackend for InMemoryNotepad {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn is_persistent(&self) -> bool {
        false
    }

    async fn put(&self, note: Note) -> Result<(), NotepadError> {
        put_front(&mut *self.notes.write().await, note);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, NotepadError> {
        Ok(self.notes.read().await.iter().find(|n| n.id == id).cloned())
    }

    async fn list(&self, filter: &NoteFilter) -> Result<Vec<Note>, NotepadError> {
        Ok(filter_notes(&self.notes.read().await, filter))
    }

    async fn remove(&self, id: &str) -> Result<bool, NotepadError> {
        let mut notes = self.notes.write().await;
        let before = notes.len();
        notes.retain(|n| n.id != id);
        Ok(notes.len() != before)
    }

    async fn clear(&self) -> Result<(), NotepadError> {
        self.notes.write().await.clear();
        Ok(())
    }
}
