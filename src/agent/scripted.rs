//! In-process agent with queued replies, used by tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AgentError, AgentEvent, AgentHandle, AgentId, AgentRole};
use crate::conversation::ChatMessage;

#[derive(Debug, Clone)]
pub(crate) enum ScriptedReply {
    Text(String),
    Chunks(Vec<String>),
    /// Send one chunk, then an error event.
    Fail(String),
    /// Refuse the call before streaming starts.
    Reject(String),
    /// Stream one chunk and then never finish.
    Hang,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub message: String,
    pub history: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
}

pub(crate) struct ScriptedAgent {
    id: AgentId,
    role: AgentRole,
    available: AtomicBool,
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedAgent {
    pub fn new(id: &str, role: AgentRole) -> Self {
        Self {
            id: AgentId::new(id),
            role,
            available: AtomicBool::new(true),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn senior(id: &str) -> Self {
        Self::new(id, AgentRole::Senior)
    }

    pub fn junior(id: &str) -> Self {
        Self::new(id, AgentRole::Junior)
    }

    pub fn with_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_all(replies.into_iter().map(|r| ScriptedReply::Text(r.into())));
        self
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        self.push_all(replies);
        self
    }

    fn push_all(&self, replies: impl IntoIterator<Item = ScriptedReply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn into_arc(self) -> Arc<dyn AgentHandle> {
        Arc::new(self)
    }
}

#[async_trait]
impl AgentHandle for ScriptedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    async fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn invoke_stream(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<(mpsc::Receiver<AgentEvent>, JoinHandle<()>), AgentError> {
        self.calls.lock().unwrap().push(RecordedCall {
            message: message.to_string(),
            history: history.to_vec(),
            system_prompt: system_prompt.map(str::to_string),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::Text(format!("{} done", self.id)));

        if let ScriptedReply::Reject(message) = &reply {
            return Err(AgentError::Failed(message.clone()));
        }

        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(async move {
            match reply {
                ScriptedReply::Text(text) => {
                    let _ = tx.send(AgentEvent::TextDelta { content: text }).await;
                    let _ = tx.send(AgentEvent::Complete).await;
                }
                ScriptedReply::Chunks(chunks) => {
                    for content in chunks {
                        let _ = tx.send(AgentEvent::TextDelta { content }).await;
                    }
                    let _ = tx.send(AgentEvent::Complete).await;
                }
                ScriptedReply::Fail(message) => {
                    let _ = tx
                        .send(AgentEvent::TextDelta {
                            content: "partial".to_string(),
                        })
                        .await;
                    let _ = tx.send(AgentEvent::Error { message }).await;
                }
                ScriptedReply::Hang => {
                    let _ = tx
                        .send(AgentEvent::TextDelta {
                            content: "thinking".to_string(),
                        })
                        .await;
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    drop(tx);
                }
                ScriptedReply::Reject(_) => {}
            }
        });

        Ok((rx, handle))
    }
}
