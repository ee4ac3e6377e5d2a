//! NDJSON events emitted by the Claude CLI in `stream-json` mode, and the
//! single document it prints in `json` mode.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::agent::AgentEvent;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum CliEvent {
    #[serde(rename = "system")]
    System(SystemEvent),
    #[serde(rename = "stream_event")]
    StreamEvent(StreamEventWrapper),
    #[serde(rename = "assistant")]
    Assistant(AssistantEvent),
    #[serde(rename = "result")]
    Result(ResultEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemEvent {
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamEventWrapper {
    pub event: StreamEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart {},
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: Delta },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(rename = "type")]
    pub delta_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantEvent {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Final event of a CLI run. Also the shape of `--output-format json` output.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultEvent {
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ResultEvent {
    /// Best available error message, unwrapping embedded API error JSON
    /// (e.g. `402 {"type":"error","error":{"message":"..."}}`).
    pub fn error_message(&self) -> String {
        let raw = self
            .result
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.errors.first().map(String::as_str).filter(|s| !s.is_empty()))
            .unwrap_or("Unknown error");

        parse_error_json(raw).unwrap_or_else(|| raw.to_string())
    }
}

fn parse_error_json(raw: &str) -> Option<String> {
    let json_str = raw.find('{').map(|idx| &raw[idx..])?;
    let parsed: Value = serde_json::from_str(json_str).ok()?;
    parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| parsed.get("message").and_then(|m| m.as_str()))
        .map(|s| s.to_string())
}

/// Tracks what has been forwarded for one run so text is emitted once,
/// whether it arrives as partial deltas or as whole assistant messages.
///
/// Text from consecutive assistant messages (e.g. either side of a tool
/// call) is separated by a newline so a directive opening the last message
/// starts on its own line.
#[derive(Debug, Default)]
pub struct StreamState {
    streamed_deltas: bool,
    emitted_text: bool,
    at_line_start: bool,
    message_pending: bool,
    finished: bool,
}

impl StreamState {
    pub fn finished(&self) -> bool {
        self.finished
    }

    fn push_text(&mut self, out: &mut Vec<AgentEvent>, text: String) {
        let content = if self.message_pending && self.emitted_text && !self.at_line_start {
            format!("\n{}", text)
        } else {
            text
        };
        self.message_pending = false;
        self.emitted_text = true;
        self.at_line_start = content.ends_with('\n');
        out.push(AgentEvent::TextDelta { content });
    }

    /// Convert one CLI event into agent events.
    pub fn convert(&mut self, event: CliEvent) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        match event {
            CliEvent::System(sys) => {
                debug!(
                    subtype = %sys.subtype,
                    session_id = ?sys.session_id,
                    model = ?sys.model,
                    "CLI session initialized"
                );
            }
            CliEvent::StreamEvent(wrapper) => match wrapper.event {
                StreamEvent::MessageStart {} => self.message_pending = true,
                StreamEvent::ContentBlockDelta { delta, .. } => {
                    if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                        self.streamed_deltas = true;
                        self.push_text(&mut out, text);
                    }
                }
                StreamEvent::Other => {}
            },
            CliEvent::Assistant(evt) => {
                if !self.streamed_deltas {
                    self.message_pending = true;
                    for block in evt.message.content {
                        if let ContentBlock::Text { text } = block {
                            if !text.is_empty() {
                                self.push_text(&mut out, text);
                            }
                        }
                    }
                }
            }
            CliEvent::Result(res) => {
                self.finished = true;
                if res.is_error {
                    out.push(AgentEvent::Error {
                        message: res.error_message(),
                    });
                } else {
                    debug!(cost_usd = ?res.total_cost_usd, "CLI run finished");
                    if !self.emitted_text {
                        if let Some(text) = res.result.filter(|t| !t.is_empty()) {
                            out.push(AgentEvent::TextDelta { content: text });
                        }
                    }
                    out.push(AgentEvent::Complete);
                }
            }
            CliEvent::Other => {}
        }
        out
    }
}
