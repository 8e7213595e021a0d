//! Incremental decoding of JSON records from physical lines.
//!
//! Record boundaries are found empirically: a line is parsed on its own, and
//! when that fails it is accumulated with its predecessors until the combined
//! text parses as one JSON value. A failed parse is an ordinary outcome here,
//! so it is modelled as [`ParseOutcome`] rather than an error.

use serde_json::Value;

/// One decoded event. Objects keep their keys in file order.
pub type LogRecord = Value;

/// Default hard cap on accumulated fragment text, in bytes.
pub const DEFAULT_MAX_PENDING_BYTES: usize = 1_000_000;

/// Result of trying to decode a piece of text as exactly one JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The text is one complete value.
    Complete(LogRecord),
    /// The text ended before a value was complete; more text may finish it.
    Incomplete,
    /// The text is malformed before its end; appending text cannot fix it.
    Invalid,
}

impl ParseOutcome {
    /// Returns the decoded record, if any.
    pub fn into_record(self) -> Option<LogRecord> {
        match self {
            ParseOutcome::Complete(record) => Some(record),
            ParseOutcome::Incomplete | ParseOutcome::Invalid => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ParseOutcome::Complete(_))
    }
}

/// Try to decode `text` as a single JSON value.
pub fn try_parse(text: &str) -> ParseOutcome {
    match serde_json::from_str::<LogRecord>(text) {
        Ok(record) => ParseOutcome::Complete(record),
        Err(e) if e.is_eof() => ParseOutcome::Incomplete,
        Err(_) => ParseOutcome::Invalid,
    }
}

/// Text accumulated from lines that have not yet formed a complete record.
#[derive(Debug)]
pub struct PendingBuffer {
    text: String,
    max_bytes: usize,
}

impl PendingBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            text: String::new(),
            max_bytes,
        }
    }

    /// Append one physical line, newline-terminated.
    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn exceeds_cap(&self) -> bool {
        self.text.len() > self.max_bytes
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Turns a sequence of physical lines from a live log into records.
#[derive(Debug)]
pub struct LineDecoder {
    pending: PendingBuffer,
    discarded: u64,
    overflows: u64,
}

impl LineDecoder {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            pending: PendingBuffer::new(max_pending_bytes),
            discarded: 0,
            overflows: 0,
        }
    }

    /// Feed one physical line (with or without its line terminator).
    ///
    /// Returns the record completed by this line, if any. When the line
    /// parses on its own but fragments are pending, the fragments joined with
    /// the line win if they form a record; otherwise the fragments are dropped
    /// and the line's own record is returned.
    pub fn push_line(&mut self, line: &str) -> Option<LogRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }

        match try_parse(line) {
            ParseOutcome::Complete(record) => {
                if self.pending.is_empty() {
                    return Some(record);
                }
                let combined = format!("{}\n{}", self.pending.as_str(), line);
                if let ParseOutcome::Complete(joined) = try_parse(&combined) {
                    self.pending.clear();
                    return Some(joined);
                }
                self.discard("fragment did not combine with a complete line");
                Some(record)
            }
            ParseOutcome::Incomplete | ParseOutcome::Invalid => {
                self.pending.push_line(line);
                match try_parse(self.pending.as_str()) {
                    ParseOutcome::Complete(record) => {
                        self.pending.clear();
                        Some(record)
                    }
                    ParseOutcome::Invalid => {
                        self.discard("fragment is not valid JSON");
                        None
                    }
                    ParseOutcome::Incomplete => {
                        if self.pending.exceeds_cap() {
                            self.overflows += 1;
                            tracing::warn!(
                                pending_bytes = self.pending.len(),
                                overflows = self.overflows,
                                "pending fragment exceeded cap, dropping it"
                            );
                            self.pending.clear();
                        }
                        None
                    }
                }
            }
        }
    }

    fn discard(&mut self, reason: &'static str) {
        self.discarded += 1;
        tracing::debug!(
            pending_bytes = self.pending.len(),
            discarded = self.discarded,
            reason,
            "dropping pending fragment"
        );
        self.pending.clear();
    }

    /// Bytes currently held as an unfinished record.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Fragments dropped because they could never form a record.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Fragments dropped because they outgrew the cap.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }
}
