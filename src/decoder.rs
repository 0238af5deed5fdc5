//! Decoding of individual protocol lines into stream events.
//!
//! The transport delivers a line-framed event stream.  Each line is blank, a comment, or a
//! `data:` field whose payload is either a JSON chunk or the literal end sentinel.  The decoder
//! turns one line into at most one [`StreamEvent`] and performs no I/O.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::StreamEvent;

/// Field prefix that marks a payload line.
pub const DATA_PREFIX: &str = "data:";

/// Payload that terminates the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single line decoded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A content and/or reasoning delta to deliver.
    Event(StreamEvent),

    /// Nothing to deliver: blank line, comment, foreign field, or an empty chunk.
    Skip,

    /// The end sentinel.  No further lines should be consumed.
    Done,
}

impl Decoded {
    /// Returns the event, if any.
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            Decoded::Event(event) => Some(event),
            Decoded::Skip | Decoded::Done => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Line decoder for one stream.
///
/// The only state is whether a content delta has been seen yet: the first one has its leading
/// whitespace stripped.  Use a fresh decoder for every stream.
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    first_content: bool,
}

impl StreamDecoder {
    /// Creates a decoder for a new stream.
    pub fn new() -> Self {
        Self {
            first_content: true,
        }
    }

    /// Decodes one raw line.
    ///
    /// Malformed JSON payloads produce a decode error; they are never skipped silently.
    pub fn decode(&mut self, line: &str) -> Result<Decoded> {
        let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim) else {
            return Ok(Decoded::Skip);
        };
        if payload == DONE_SENTINEL {
            return Ok(Decoded::Done);
        }
        if payload.is_empty() {
            return Ok(Decoded::Skip);
        }

        let chunk: ChunkPayload = serde_json::from_str(payload).map_err(|e| {
            Error::decode(
                format!("failed to parse streaming chunk {payload:?}: {e}"),
                Some(Box::new(e)),
            )
        })?;
        let Some(delta) = chunk.choices.into_iter().next().and_then(|c| c.delta) else {
            return Ok(Decoded::Skip);
        };

        // The trim is spent only once a content delta actually carries text.
        let content = delta.content.map(|content| {
            if !self.first_content {
                return content;
            }
            let trimmed = content.trim_start();
            if !trimmed.is_empty() {
                self.first_content = false;
            }
            trimmed.to_string()
        });
        let content = content.filter(|c| !c.is_empty());
        let reasoning = delta.reasoning_content.filter(|r| !r.is_empty());

        Ok(StreamEvent::new(content, reasoning).map_or(Decoded::Skip, Decoded::Event))
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
