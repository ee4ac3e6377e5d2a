//! Incremental decoding of OpenAI-style `text/event-stream` bodies.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    Payload(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Splits arbitrary byte chunks into `data:` payloads. Chunks may end in the
/// middle of a line or of a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = decode_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Option<SseData> {
        let line = std::mem::take(&mut self.buffer);
        decode_line(&line)
    }
}

fn decode_line(raw: &[u8]) -> Option<SseData> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseData::Done);
    }
    Some(SseData::Payload(payload.to_string()))
}

#[derive(Debug, Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
}

/// Outcome of one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    Text(String),
    Empty,
    Error(String),
}

/// Interpret a streaming chunk. Unparseable payloads are treated as empty.
pub fn parse_chunk(payload: &str) -> ChunkOutcome {
    let body: ChunkBody = match serde_json::from_str(payload) {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Skipping unparseable stream chunk: {}", e);
            return ChunkOutcome::Empty;
        }
    };
    if let Some(error) = body.error {
        return ChunkOutcome::Error(
            error
                .message
                .unwrap_or_else(|| "stream reported an error".to_string()),
        );
    }
    match body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
    {
        Some(text) => ChunkOutcome::Text(text),
        None => ChunkOutcome::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lines_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let out = decoder.push(b"1}\r\n\r\n: keepalive\ndata: [DONE]\n");
        assert_eq!(
            out,
            vec![SseData::Payload("{\"a\":1}".to_string()), SseData::Done]
        );
    }

    #[test]
    fn keeps_multibyte_characters_split_across_chunks() {
        let text = "data: {\"c\":\"é\"}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(&text[..split]).is_empty());
        assert_eq!(
            decoder.push(&text[split..]),
            vec![SseData::Payload("{\"c\":\"é\"}".to_string())]
        );
    }

    #[test]
    fn finish_flushes_trailing_line() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.finish(), Some(SseData::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn parses_chunk_variants() {
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            ChunkOutcome::Text("Hi".to_string())
        );
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            ChunkOutcome::Empty
        );
        assert_eq!(parse_chunk("not json"), ChunkOutcome::Empty);
        assert_eq!(
            parse_chunk(r#"{"error":{"message":"model crashed"}}"#),
            ChunkOutcome::Error("model crashed".to_string())
        );
    }
}
