// Incremental decoding of an event stream body.

use serde::{Deserialize, Serialize};
use shop_models::OrderSnapshot;

use crate::message::{parse_line, LineOutcome};

/// Turns arbitrarily split byte chunks into complete text lines.
///
/// Two pieces of state survive between chunks: the bytes of a UTF-8
/// sequence cut off at the end of a chunk, and the text of the line that has
/// not seen its `\n` yet.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending_bytes: Vec<u8>,
    pending_line: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed, without the
    /// terminator. A trailing `\r` is dropped so CRLF streams work too.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.take_complete_lines()
    }

    /// Flushes what is left at end of stream. A dangling partial UTF-8
    /// sequence becomes U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.pending_line.push(char::REPLACEMENT_CHARACTER);
            self.pending_bytes.clear();
        }
        if self.pending_line.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending_line);
        Some(rest.strip_suffix('\r').unwrap_or(&rest).to_string())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_bytes.is_empty() || !self.pending_line.is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        let mut consumed = 0;
        while consumed < self.pending_bytes.len() {
            match std::str::from_utf8(&self.pending_bytes[consumed..]) {
                Ok(text) => {
                    self.pending_line.push_str(text);
                    consumed = self.pending_bytes.len();
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    self.pending_line
                        .push_str(&String::from_utf8_lossy(&self.pending_bytes[consumed..valid_end]));
                    match e.error_len() {
                        Some(invalid) => {
                            self.pending_line.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid;
                        }
                        None => {
                            // incomplete sequence, wait for the next chunk
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending_bytes.drain(..consumed);
    }

    fn take_complete_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.pending_line.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending_line.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending_line, rest);

        complete[..last_newline]
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub updates: u64,
    pub malformed: u64,
    pub ignored: u64,
}

/// Line decoder plus event extraction: bytes in, order snapshots out.
///
/// Malformed and unrecognised lines are dropped and counted; they never
/// end the stream.
#[derive(Debug, Default)]
pub struct UpdateDecoder {
    lines: LineDecoder,
    stats: DecodeStats,
}

impl UpdateDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<OrderSnapshot> {
        let lines = self.lines.push(chunk);
        lines.iter().filter_map(|line| self.process_line(line)).collect()
    }

    pub fn finish(&mut self) -> Option<OrderSnapshot> {
        let line = self.lines.finish()?;
        self.process_line(&line)
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn process_line(&mut self, line: &str) -> Option<OrderSnapshot> {
        match parse_line(line) {
            LineOutcome::Update(order) => {
                self.stats.updates += 1;
                Some(order)
            }
            LineOutcome::Malformed(e) => {
                self.stats.malformed += 1;
                tracing::debug!("discarding malformed event stream line: {}", e);
                None
            }
            LineOutcome::Ignored { kind } => {
                self.stats.ignored += 1;
                tracing::trace!(kind = %kind, "ignoring event stream message");
                None
            }
            LineOutcome::Skipped => None,
        }
    }
}
