//! Newline-delimited JSON framing of chat events.
//!
//! Each event is one compact JSON object followed by `\n`. The stream has no
//! terminator, the end of the response body ends the stream.

use bytes::Bytes;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::Message;

/// Encode one event as a complete line
pub fn encode_line(message: &Message) -> AgentResult<Bytes> {
    let mut line = serde_json::to_vec(message)
        .map_err(|e| AgentError::Transport(format!("Could not encode event: {}", e)))?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}

/// Incremental decoder for a chunked event stream.
///
/// Chunks may end anywhere, including inside a multi-byte character, so raw
/// bytes are buffered until a newline arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(message) = self.decode(&line) {
                messages.push(message);
            }
        }
        messages
    }

    /// Decode whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<Message> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode(&rest)
    }

    /// Number of lines dropped because they did not parse
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode(&mut self, line: &[u8]) -> Option<Message> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        match serde_json::from_str::<Message>(text) {
            Ok(message) => Some(message),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, "skipping malformed stream line");
                None
            }
        }
    }
}
