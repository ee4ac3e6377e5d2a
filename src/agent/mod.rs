pub mod claudecode;
pub mod events;
pub mod openai;
pub mod registry;
#[cfg(test)]
pub(crate) mod scripted;
mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conversation::ChatMessage;

pub use events::AgentEvent;
pub use registry::{AgentInfo, AgentRegistry};
pub use types::{AgentError, AgentId, AgentRole};

/// A conversational agent behind a transport (subprocess, HTTP, ...).
///
/// Timeouts are enforced by the implementation; callers treat them as
/// ordinary failures.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    fn id(&self) -> &AgentId;
    fn name(&self) -> &str;
    fn role(&self) -> AgentRole;

    /// Whether the agent can currently serve calls.
    async fn available(&self) -> bool;

    /// Stream a reply as [`AgentEvent`]s. The stream is finished only after
    /// `AgentEvent::Complete`.
    async fn invoke_stream(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<(mpsc::Receiver<AgentEvent>, JoinHandle<()>), AgentError>;

    /// Produce a complete reply.
    async fn invoke(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, AgentError> {
        let (rx, handle) = self.invoke_stream(message, history, system_prompt).await?;
        let reply = events::collect_reply(rx).await;
        handle.abort();
        reply
    }
}
