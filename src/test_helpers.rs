//! Test utilities for creating scratch event logs and collecting follower output.

use crate::decoder::LogRecord;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_file = Self::missing()?;
        File::create(&temp_file.path)?;
        Ok(temp_file)
    }

    /// Reserve a log path inside a temporary directory without creating the file
    pub fn missing() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("eve.json");

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append content exactly as given
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        self.append_bytes(content.as_bytes())
    }

    /// Append one newline-terminated line
    pub fn append_line(&self, line: &str) -> std::io::Result<()> {
        self.append_content(&format!("{}\n", line))
    }

    pub fn append_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place (copytruncate-style rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        Ok(())
    }

    /// Move the file aside and start a fresh, empty one at the same path
    pub fn rotate(&self) -> std::io::Result<PathBuf> {
        let rotated = self.path.with_extension("json.1");
        fs::rename(&self.path, &rotated)?;
        File::create(&self.path)?;
        Ok(rotated)
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build `count` single-line alert records numbered from `first`.
pub fn alert_lines(first: u64, count: u64) -> String {
    (first..first + count)
        .map(|seq| format!("{{\"event_type\":\"alert\",\"seq\":{}}}\n", seq))
        .collect()
}

/// The `seq` field of each record, for order assertions.
pub fn seqs(records: &[LogRecord]) -> Vec<u64> {
    records
        .iter()
        .filter_map(|record| record["seq"].as_u64())
        .collect()
}

/// Receive records until `count` have arrived or `timeout` elapses.
pub async fn collect_records(
    rx: &mut mpsc::UnboundedReceiver<LogRecord>,
    count: usize,
    timeout: Duration,
) -> Vec<LogRecord> {
    let mut records = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    while records.len() < count {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) | Err(_) => break,
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_missing_temp_log_file() {
        let temp_file = TempLogFile::missing().unwrap();
        assert!(!temp_file.path().exists());

        temp_file.append_line("{}").unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_append_content() {
        let temp_file = TempLogFile::with_content("line 1\n").unwrap();
        temp_file.append_line("line 2").unwrap();
        temp_file.append_content("partial").unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "line 1\nline 2\npartial");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_rotate() {
        let temp_file = TempLogFile::with_content("old\n").unwrap();
        let rotated = temp_file.rotate().unwrap();

        assert_eq!(fs::read_to_string(&rotated).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(temp_file.path()).unwrap(), "");
    }

    #[test]
    fn test_alert_lines_and_seqs() {
        let lines = alert_lines(3, 2);
        assert_eq!(
            lines,
            "{\"event_type\":\"alert\",\"seq\":3}\n{\"event_type\":\"alert\",\"seq\":4}\n"
        );

        let records = crate::reader::decode_backlog_lines(&lines, 10);
        assert_eq!(seqs(&records), vec![3, 4]);
    }
}
