//! Line-delimited JSON framing.
//!
//! The device terminates every JSON object with `\r\n`. TCP reads may end
//! anywhere: mid-frame, mid-delimiter, or even inside a multi-byte UTF-8
//! sequence. [`LineCodec`] buffers raw bytes and only decodes complete lines,
//! so split points never change what comes out.
//!
//! # Example
//!
//! ```
//! use intellicenter_client::transport::LineCodec;
//!
//! let mut codec = LineCodec::new(1024);
//! assert!(codec.feed(b"{\"command\":\"Notify").is_empty());
//!
//! let frames = codec.feed(b"List\"}\r\n{\"a\":1}\r\n");
//! assert_eq!(frames.len(), 2);
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Frame delimiter.
pub const DELIMITER: &[u8] = b"\r\n";

// ============================================================================
// Types
// ============================================================================

/// One decoded frame, or the reason it was dropped.
pub type Frame = Result<Map<String, Value>>;

// ============================================================================
// Encoding
// ============================================================================

/// Serializes a message as one delimited frame.
///
/// # Errors
///
/// Returns [`Error::Json`] if the message cannot be serialized.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.extend_from_slice(DELIMITER);
    Ok(bytes)
}

// ============================================================================
// LineCodec
// ============================================================================

/// Incremental decoder for the device's byte stream.
#[derive(Debug)]
pub struct LineCodec {
    /// Bytes received after the last complete frame.
    buffer: Vec<u8>,
    /// Largest partial frame kept before giving up on it.
    max_frame_len: usize,
    /// Set while skipping the rest of an oversized frame.
    discarding: bool,
    /// Buffer offset before which no delimiter can start.
    scan_from: usize,
}

impl LineCodec {
    /// Creates a decoder that buffers at most `max_frame_len` bytes of a
    /// single frame.
    #[inline]
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_len,
            discarding: false,
            scan_from: 0,
        }
    }

    /// Returns the number of buffered bytes belonging to a partial frame.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consumes a chunk and returns every frame it completed, in order.
    ///
    /// Malformed frames come back as [`Error::Framing`] in their position;
    /// they do not affect the frames around them. Empty lines are skipped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut search = self.scan_from;

        while let Some(offset) = find_delimiter(&self.buffer[search..]) {
            let end = search + offset;
            if self.discarding {
                self.discarding = false;
            } else if end > start {
                frames.push(decode_line(&self.buffer[start..end]));
            }
            start = end + DELIMITER.len();
            search = start;
        }

        self.buffer.drain(..start);
        // A trailing '\r' may still pair with the next chunk's '\n'.
        self.scan_from = self.buffer.len().saturating_sub(1);

        if self.buffer.len() > self.max_frame_len {
            // Keep a trailing '\r' so a delimiter split across reads is still seen.
            let keep = usize::from(self.buffer.last() == Some(&b'\r'));
            let dropped = self.buffer.len() - keep;
            self.buffer.drain(..dropped);
            self.scan_from = 0;
            if !self.discarding {
                frames.push(Err(Error::framing(format!(
                    "frame exceeds {} bytes",
                    self.max_frame_len
                ))));
            }
            self.discarding = true;
        }

        frames
    }

    /// Drops any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
        self.scan_from = 0;
    }
}

/// Finds the first `\r\n` in `bytes`.
fn find_delimiter(bytes: &[u8]) -> Option<usize> {
    bytes.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

/// Decodes one complete line into a JSON object.
fn decode_line(line: &[u8]) -> Frame {
    match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::framing(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::framing(format!("invalid JSON: {e}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Tests
// ============================================================================
