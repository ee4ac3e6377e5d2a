use tokio::sync::mpsc;

use super::AgentError;

/// Events produced by a streaming agent call.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Text content being streamed.
    TextDelta { content: String },
    /// The reply is complete.
    Complete,
    /// The agent failed mid-stream.
    Error { message: String },
}

/// Drain a stream into the full reply text.
///
/// A channel that closes before `Complete` is reported as
/// [`AgentError::Interrupted`].
pub async fn collect_reply(mut rx: mpsc::Receiver<AgentEvent>) -> Result<String, AgentError> {
    let mut reply = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::TextDelta { content } => reply.push_str(&content),
            AgentEvent::Complete => return Ok(reply),
            AgentEvent::Error { message } => return Err(AgentError::Failed(message)),
        }
    }
    Err(AgentError::Interrupted)
}
