//! Senior agent backed by the Claude CLI running in print mode.

pub mod events;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AgentError, AgentEvent, AgentHandle, AgentId, AgentRole};
use crate::conversation::{ChatMessage, Role};
use crate::util::preview;

use events::{CliEvent, ResultEvent, StreamState};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the Claude CLI agent.
#[derive(Debug, Clone)]
pub struct ClaudeCodeConfig {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub cli_path: String,
    /// Bare model id; an `anthropic/` prefix is stripped.
    pub model: Option<String>,
    /// Per-call bound, covering spawn to process exit.
    pub timeout: Duration,
    /// Used when the caller does not pass a system prompt.
    pub system_prompt: Option<String>,
    /// JSON string or path handed to `--mcp-config`.
    pub mcp_config: Option<String>,
    pub skip_permissions: bool,
    pub extra_args: Vec<String>,
}

impl Default for ClaudeCodeConfig {
    fn default() -> Self {
        Self {
            id: "claude-code".to_string(),
            name: "Claude Code".to_string(),
            role: AgentRole::Senior,
            cli_path: "claude".to_string(),
            model: None,
            timeout: Duration::from_secs(300),
            system_prompt: None,
            mcp_config: None,
            skip_permissions: false,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Json,
    StreamJson,
}

pub struct ClaudeCodeAgent {
    id: AgentId,
    config: ClaudeCodeConfig,
}

impl ClaudeCodeAgent {
    pub fn new(config: ClaudeCodeConfig) -> Self {
        Self {
            id: AgentId::new(config.id.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ClaudeCodeConfig {
        &self.config
    }

    fn cli_args(&self, mode: OutputMode, system_prompt: Option<&str>) -> Vec<String> {
        let mut args = vec!["--print".to_string(), "--output-format".to_string()];
        match mode {
            OutputMode::Json => args.push("json".to_string()),
            OutputMode::StreamJson => {
                args.push("stream-json".to_string());
                args.push("--verbose".to_string());
                args.push("--include-partial-messages".to_string());
            }
        }

        if let Some(prompt) = system_prompt.or(self.config.system_prompt.as_deref()) {
            args.push("--system-prompt".to_string());
            args.push(prompt.to_string());
        }

        if let Some(model) = self.config.model.as_deref() {
            let bare = model.strip_prefix("anthropic/").unwrap_or(model);
            args.push("--model".to_string());
            args.push(bare.to_string());
        }

        if let Some(mcp) = self.config.mcp_config.as_deref() {
            args.push("--mcp-config".to_string());
            args.push(mcp.to_string());
        }

        if self.config.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }

        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    async fn spawn(
        &self,
        mode: OutputMode,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<Child, AgentError> {
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.args(self.cli_args(mode, system_prompt))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match mode {
                OutputMode::Json => Stdio::piped(),
                OutputMode::StreamJson => Stdio::null(),
            })
            .kill_on_drop(true);

        info!(
            agent = %self.id,
            mode = ?mode,
            model = ?self.config.model,
            history = history.len(),
            "Spawning Claude CLI"
        );

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn Claude CLI: {}", e);
            AgentError::Spawn(format!(
                "{}. Is it installed at '{}'?",
                e, self.config.cli_path
            ))
        })?;

        // The CLI reads the prompt until EOF, so stdin is closed once written.
        if let Some(mut stdin) = child.stdin.take() {
            let transcript = build_transcript(message, history);
            stdin
                .write_all(transcript.as_bytes())
                .await
                .map_err(|e| AgentError::Spawn(format!("Failed to write prompt: {}", e)))?;
        }

        Ok(child)
    }
}

/// Flatten history plus the new message into a `User:` / `Assistant:`
/// transcript. System turns travel through `--system-prompt` instead.
pub fn build_transcript(message: &str, history: &[ChatMessage]) -> String {
    let mut parts: Vec<String> = history
        .iter()
        .filter_map(|msg| match msg.role {
            Role::User => Some(format!("User: {}", msg.content)),
            Role::Assistant => Some(format!("Assistant: {}", msg.content)),
            Role::System => None,
        })
        .collect();
    parts.push(format!("User: {}", message));
    parts.push("Assistant:".to_string());
    parts.join("\n\n")
}

/// Parse `--output-format json` output. Non-JSON output is taken verbatim.
fn parse_json_output(stdout: &str) -> Result<String, AgentError> {
    match serde_json::from_str::<ResultEvent>(stdout) {
        Ok(res) if res.is_error => Err(AgentError::Failed(res.error_message())),
        Ok(res) => Ok(res.result.unwrap_or_default()),
        Err(_) => Ok(stdout.trim().to_string()),
    }
}

#[async_trait]
impl AgentHandle for ClaudeCodeAgent {
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
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(VERSION_PROBE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                debug!("Claude CLI not available: {}", e);
                false
            }
            Err(_) => {
                warn!("Claude CLI version check timed out");
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
        let child = self
            .spawn(OutputMode::Json, message, history, system_prompt)
            .await?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout(self.config.timeout))?
            .map_err(|e| AgentError::Failed(format!("Failed to wait for Claude CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Ok(res) = serde_json::from_str::<ResultEvent>(&stdout) {
                if res.is_error {
                    return Err(AgentError::Failed(res.error_message()));
                }
            }
            let detail = if stderr.trim().is_empty() {
                format!("exit status {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            error!(agent = %self.id, "Claude CLI failed: {}", detail);
            return Err(AgentError::Failed(detail));
        }

        parse_json_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn invoke_stream(
        &self,
        message: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<(mpsc::Receiver<AgentEvent>, JoinHandle<()>), AgentError> {
        let mut child = self
            .spawn(OutputMode::StreamJson, message, history, system_prompt)
            .await?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("Failed to capture Claude stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(256);
        let timeout = self.config.timeout;
        let agent_id = self.id.clone();

        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut state = StreamState::default();

            let read_all = async {
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event = match serde_json::from_str::<CliEvent>(&line) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!("Failed to parse Claude event: {} - line: {}", e, preview(&line, 200));
                            continue;
                        }
                    };
                    for out in state.convert(event) {
                        if tx.send(out).await.is_err() {
                            debug!("Receiver dropped, stopping Claude event stream");
                            return false;
                        }
                    }
                    if state.finished() {
                        break;
                    }
                }
                true
            };

            match tokio::time::timeout(timeout, read_all).await {
                Ok(true) => {}
                Ok(false) => {
                    let _ = child.kill().await;
                    return;
                }
                Err(_) => {
                    warn!(agent = %agent_id, "Claude CLI timed out after {:?}", timeout);
                    let _ = child.kill().await;
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: format!("timed out after {:?}", timeout),
                        })
                        .await;
                    return;
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => debug!("Claude CLI exited successfully"),
                Ok(status) => {
                    warn!("Claude CLI exited with status: {}", status);
                    if !state.finished() {
                        let _ = tx
                            .send(AgentEvent::Error {
                                message: format!("Claude CLI exited with status {}", status),
                            })
                            .await;
                    }
                }
                Err(e) => error!("Failed to wait for Claude CLI: {}", e),
            }
        });

        Ok((rx, handle))
    }
}
