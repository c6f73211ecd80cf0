//! `text/event-stream` framing and event decoding.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder`] reassembles lines across
//! chunk boundaries and yields one [`SseFrame`] per blank-line-terminated
//! block. Comment lines (`:keep-alive`) never produce frames.

use std::time::Duration;

use crate::{error::DecodeError, types::Event};

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if any.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field, if this frame carried one.
    pub id: Option<String>,
    /// `retry:` field in milliseconds.
    pub retry: Option<Duration>,
}

/// Longest line the decoder buffers before giving up on it.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Incremental SSE parser.
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    max_line_bytes: usize,
    /// Set once the start of the stream has been checked for a byte-order mark.
    started: bool,
    /// Skipping the rest of an over-long line.
    discarding: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    retry: Option<Duration>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
            started: false,
            discarding: false,
            event: None,
            data: Vec::new(),
            id: None,
            retry: None,
        }
    }

    /// Feed one chunk and collect every frame it completes.
    ///
    /// A line longer than the limit is dropped and reported as
    /// [`DecodeError::LineTooLong`]; decoding resumes at the next line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame, DecodeError>> {
        self.pending.extend_from_slice(chunk);
        if !self.skip_bom() {
            return Vec::new();
        }

        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.len() > self.max_line_bytes {
                frames.push(Err(self.line_too_long()));
                continue;
            }
            if let Some(frame) = self.feed_line(&String::from_utf8_lossy(line)) {
                frames.push(Ok(frame));
            }
        }

        if self.discarding {
            self.pending.clear();
        } else if self.pending.len() > self.max_line_bytes {
            self.pending.clear();
            self.discarding = true;
            frames.push(Err(self.line_too_long()));
        }
        frames
    }

    /// Flush a trailing frame when the stream ends without a final blank line.
    pub fn finish(mut self) -> Option<SseFrame> {
        let tail = std::mem::take(&mut self.pending);
        let partial_bom = !self.started && BOM.starts_with(&tail);
        if !tail.is_empty() && !partial_bom && !self.discarding {
            let line = String::from_utf8_lossy(&tail);
            let line = line.strip_suffix('\r').unwrap_or(&line).to_owned();
            if let Some(frame) = self.feed_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    /// Drop a leading UTF-8 byte-order mark. Returns `false` while the first
    /// bytes could still be the start of one.
    fn skip_bom(&mut self) -> bool {
        if self.started {
            return true;
        }
        if self.pending.len() < BOM.len() && BOM.starts_with(&self.pending) {
            return false;
        }
        if self.pending.starts_with(BOM) {
            self.pending.drain(..BOM.len());
        }
        self.started = true;
        true
    }

    fn line_too_long(&self) -> DecodeError {
        DecodeError::LineTooLong {
            limit: self.max_line_bytes,
        }
    }

    fn feed_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            // A NUL in the id is ignored per the event-stream format.
            "id" if !value.contains('\0') => self.id = Some(value.to_owned()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.event.is_none() && self.data.is_empty() && self.id.is_none() && self.retry.is_none()
        {
            return None;
        }
        Some(SseFrame {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
            retry: self.retry.take(),
        })
    }
}

/// Decode the event carried by a frame.
///
/// Frames without data (keep-alives, bare `retry:`/`id:` updates) yield
/// `Ok(None)`.
pub fn decode_event(frame: &SseFrame) -> Result<Option<Event>, DecodeError> {
    if frame.data.trim().is_empty() {
        return Ok(None);
    }
    let event: Event = serde_json::from_str(&frame.data)
        .map_err(|err| DecodeError::InvalidEvent(err.to_string()))?;
    if event.id.trim().is_empty() {
        return Err(DecodeError::EmptyId);
    }
    Ok(Some(event))
}
