//! Junior agent backed by an OpenAI-compatible HTTP endpoint (LM Studio,
//! Ollama, vLLM, ...), with automatic retry for transient errors.

pub mod error;
pub mod sse;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AgentError, AgentEvent, AgentHandle, AgentId, AgentRole};
use crate::conversation::{ChatMessage, Role};

pub use error::{classify_http_status, HttpError, HttpErrorKind, RetryConfig};
use sse::{parse_chunk, ChunkOutcome, SseData, SseDecoder};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for an OpenAI-compatible agent.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    /// Base URL including the version segment, e.g. `http://localhost:1234/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Per-call bound, including the streamed body.
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Used when the caller does not pass a system prompt.
    pub system_prompt: Option<String>,
    pub retry: RetryConfig,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            id: "local-model".to_string(),
            name: "Local Model".to_string(),
            role: AgentRole::Junior,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            timeout: Duration::from_secs(120),
            max_tokens: 4096,
            temperature: 0.7,
            system_prompt: None,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatAgent {
    id: AgentId,
    config: OpenAiCompatConfig,
    client: Client,
}

impl OpenAiCompatAgent {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        Self {
            id: AgentId::new(config.id.clone()),
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// System prompt first, then history, then the new user message.
    fn build_messages(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(prompt) = system_prompt.or(self.config.system_prompt.as_deref()) {
            messages.push(ChatMessage::new(Role::System, prompt));
        }
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new(Role::User, message));
        messages
    }

    fn request<'a>(&'a self, messages: Vec<ChatMessage>, stream: bool) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        }
    }

    /// POST the request and return the response if the status is a success.
    async fn send(&self, request: &ChatCompletionRequest<'_>) -> Result<reqwest::Response, HttpError> {
        let mut builder = self
            .client
            .post(self.endpoint("chat/completions"))
            .timeout(self.config.timeout)
            .json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(HttpError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = error::parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(HttpError::from_status(status.as_u16(), &body, retry_after))
    }

    async fn execute_request(&self, request: &ChatCompletionRequest<'_>) -> Result<String, HttpError> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(HttpError::from_reqwest)?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            HttpError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| HttpError::parse_error("No choices in response".to_string()))
    }

    async fn execute_with_retry(&self, request: &ChatCompletionRequest<'_>) -> Result<String, HttpError> {
        let retry = &self.config.retry;
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            match self.execute_request(request).await {
                Ok(reply) => {
                    if attempt > 0 {
                        tracing::info!(
                            "Request succeeded after {} retries (total time: {:?})",
                            attempt,
                            start.elapsed()
                        );
                    }
                    return Ok(reply);
                }
                Err(error) => {
                    let should_retry = retry.should_retry(&error) && attempt < retry.max_retries;
                    let remaining = retry.max_retry_duration.saturating_sub(start.elapsed());
                    let delay = error.suggested_delay(attempt).min(remaining);

                    if !should_retry || delay.is_zero() {
                        if attempt > 0 {
                            tracing::error!(
                                "Request failed after {} retries (total time: {:?}): {}",
                                attempt,
                                start.elapsed(),
                                error
                            );
                        } else {
                            tracing::error!("Request failed: {}", error);
                        }
                        return Err(error);
                    }

                    tracing::warn!(
                        "Retry attempt {} failed with {}, retrying in {:?}: {}",
                        attempt + 1,
                        error.kind,
                        delay,
                        error.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl AgentHandle for OpenAiCompatAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn role(&self) -> AgentRole {
        self.config.role
    }

    async fn available(&self) -> bool {
        let mut builder = self.client.get(self.endpoint("models")).timeout(PROBE_TIMEOUT);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(agent = %self.id, "Model server not reachable: {}", e);
                false
            }
        }
    }

    async fn invoke(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, AgentError> {
        let request = self.request(self.build_messages(message, history, system_prompt), false);
        Ok(self.execute_with_retry(&request).await?)
    }

    async fn invoke_stream(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<(mpsc::Receiver<AgentEvent>, JoinHandle<()>), AgentError> {
        let request = self.request(self.build_messages(message, history, system_prompt), true);
        let response = self.send(&request).await?;

        let (tx, rx) = mpsc::channel(256);
        let agent_id = self.id.clone();

        let handle = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let error = HttpError::from_reqwest(e);
                        tracing::warn!(agent = %agent_id, "Stream failed: {}", error);
                        let _ = tx
                            .send(AgentEvent::Error {
                                message: error.to_string(),
                            })
                            .await;
                        return;
                    }
                };

                for data in decoder.push(&bytes) {
                    if !forward(&tx, data).await {
                        return;
                    }
                }
            }

            if let Some(data) = decoder.finish() {
                if !forward(&tx, data).await {
                    return;
                }
            }
            // Some servers close the stream without the sentinel.
            let _ = tx.send(AgentEvent::Complete).await;
        });

        Ok((rx, handle))
    }
}

/// Forward one SSE payload. Returns `false` once the stream is over.
async fn forward(tx: &mpsc::Sender<AgentEvent>, data: SseData) -> bool {
    let event = match data {
        SseData::Done => {
            let _ = tx.send(AgentEvent::Complete).await;
            return false;
        }
        SseData::Payload(payload) => match parse_chunk(&payload) {
            ChunkOutcome::Text(content) => AgentEvent::TextDelta { content },
            ChunkOutcome::Empty => return true,
            ChunkOutcome::Error(message) => {
                let _ = tx.send(AgentEvent::Error { message }).await;
                return false;
            }
        },
    };
    tx.send(event).await.is_ok()
}
