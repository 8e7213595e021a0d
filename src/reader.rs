//! Backlog reading and byte-level helpers for the event log.

use crate::decoder::{
    DEFAULT_MAX_PENDING_BYTES, LogRecord, ParseOutcome, PendingBuffer, try_parse,
};
use crate::error::Result;
use serde_json::Value;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// How many trailing bytes of the file are inspected for the backlog.
pub const BACKLOG_WINDOW: u64 = 64 * 1024;

const ARRAY_PROBE_BYTES: u64 = 4096;

/// Read the most recent records of the file at `path`, oldest first.
///
/// Best-effort: any failure to open or read the file yields an empty backlog.
pub async fn read_backlog<P: AsRef<Path>>(path: P, max_records: usize) -> Vec<LogRecord> {
    let path = path.as_ref();
    let result = async {
        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();
        read_backlog_from(&mut file, size, max_records).await
    }
    .await;

    match result {
        Ok(records) => records,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "backlog unavailable");
            Vec::new()
        }
    }
}

/// Decode the backlog from the first `end` bytes of an already open file.
///
/// The file position is left unspecified; callers seek before reading on.
pub(crate) async fn read_backlog_from(
    file: &mut File,
    end: u64,
    max_records: usize,
) -> Result<Vec<LogRecord>> {
    if max_records == 0 || end == 0 {
        return Ok(Vec::new());
    }

    let start = window_start(end);
    let window = read_range(file, start, end).await?;
    let text = decode_lossy(&window);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let looks_like_array = if start == 0 {
        trimmed.starts_with('[')
    } else {
        trimmed.starts_with('[') || file_starts_with_array(file, end).await?
    };

    if looks_like_array {
        let whole = if start == 0 {
            text.clone()
        } else {
            decode_lossy(&read_range(file, 0, end).await?)
        };
        if let Some(records) = decode_array(&whole, max_records) {
            return Ok(records);
        }
    }

    Ok(decode_backlog_lines(trimmed, max_records))
}

/// Whether the first non-blank byte of the file opens a JSON array.
async fn file_starts_with_array(file: &mut File, end: u64) -> Result<bool> {
    let head = read_range(file, 0, end.min(ARRAY_PROBE_BYTES)).await?;
    Ok(head
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'['))
}

async fn read_range(file: &mut File, start: u64, end: u64) -> Result<Vec<u8>> {
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let mut bytes = Vec::with_capacity((end - start) as usize);
    (&mut *file).take(end - start).read_to_end(&mut bytes).await?;
    Ok(bytes)
}

/// Parse `text` as one top-level array and keep its last `max_records` items.
pub(crate) fn decode_array(text: &str, max_records: usize) -> Option<Vec<LogRecord>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => {
            let skip = items.len().saturating_sub(max_records);
            Some(items.into_iter().skip(skip).collect())
        }
        _ => None,
    }
}

/// Decode newline-delimited records from the last `max_records` physical lines.
///
/// Only physical lines are counted, so multi-line records near the start of
/// the window may be cut and dropped.
pub(crate) fn decode_backlog_lines(text: &str, max_records: usize) -> Vec<LogRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(max_records);

    let mut records = Vec::new();
    let mut pending = PendingBuffer::new(DEFAULT_MAX_PENDING_BYTES);

    for line in lines.into_iter().skip(skip) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let ParseOutcome::Complete(record) = try_parse(line) {
            records.push(record);
            pending.clear();
            continue;
        }

        pending.push_line(line);
        match try_parse(pending.as_str()) {
            ParseOutcome::Complete(record) => {
                records.push(record);
                pending.clear();
            }
            ParseOutcome::Invalid => pending.clear(),
            ParseOutcome::Incomplete if pending.exceeds_cap() => pending.clear(),
            ParseOutcome::Incomplete => {}
        }
    }

    records
}

/// Decode bytes as UTF-8, dropping any byte sequences that are not valid.
pub(crate) fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Offset at which the backlog window of a file of `size` bytes begins.
fn window_start(size: u64) -> u64 {
    size.saturating_sub(BACKLOG_WINDOW)
}

/// Detect if the file was truncated by comparing current size with the last known size
pub(crate) fn detect_file_truncation(current_size: u64, last_size: u64) -> bool {
    current_size < last_size
}
