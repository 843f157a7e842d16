// src/sse.rs
// Streamed chat completion body: `data: {...}` frames, ended by `data: [DONE]`

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
    Error(String),
}

#[derive(Debug, Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorFrame>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorFrame {
    message: Option<String>,
}

/// Splits raw body bytes into lines and turns complete `data:` lines into events.
/// Only an incomplete trailing line is held back between pushes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r')) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that arrived without a newline
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        parse_line(line.trim_end_matches('\r'))
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let frame: ChunkFrame = match serde_json::from_str(payload) {
        Ok(f) => f,
        Err(e) => {
            debug!("skipping unreadable completion frame: {}", e);
            return None;
        }
    };

    if let Some(err) = frame.error {
        return Some(SseEvent::Error(
            err.message.unwrap_or_else(|| "unknown upstream error".to_string()),
        ));
    }

    let text: String = frame
        .choices
        .into_iter()
        .filter_map(|c| c.delta?.content)
        .collect();
    (!text.is_empty()).then_some(SseEvent::Delta(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_deltas_and_done() {
        let mut decoder = SseDecoder::default();
        let body = concat!(
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\r\n\r\n",
            "data: [DONE]\n\n",
        );

        let events = decoder.push(body.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hello".into()),
                SseEvent::Delta(" there".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn holds_partial_lines_across_pushes() {
        let mut decoder = SseDecoder::default();
        let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo 👋\"}}]}\n";
        let bytes = frame.as_bytes();
        let split = frame.find('👋').unwrap() + 2; // inside the emoji

        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec![SseEvent::Delta("héllo 👋".into())]);
    }

    #[test]
    fn surfaces_error_frames_and_flushes_tail() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"error\":{\"message\":\"rate limited\"}}\n");
        assert_eq!(events, vec![SseEvent::Error("rate limited".into())]);

        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn ignores_garbage_frames() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {not json}\nevent: ping\n").is_empty());
    }
}
