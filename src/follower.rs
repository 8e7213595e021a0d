//! The long-running follower that tails the event log.
//!
//! A follower is driven by a small state machine:
//!
//! * `WaitingForFile`: the log does not exist yet; poll for it, picking up a
//!   path override from the environment if one appears.
//! * `Reopening`: open the log, replay its backlog and position a fresh
//!   cursor at the end of what was replayed.
//! * `Streaming`: read appended lines, decode them and forward records, and
//!   watch for truncation or replacement of the file.
//!
//! The follower owns its file handle, cursor and fragment buffer outright and
//! runs on a single task, so none of this state is shared.

use crate::config::TailConfig;
use crate::decoder::{LineDecoder, LogRecord};
use crate::error::Result;
use crate::reader::{decode_lossy, detect_file_truncation, read_backlog_from};
use crate::resolver::env_override;
use crate::watcher::FileWatcher;
use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

/// Identity of a file on disk, used to notice the log being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Read position within one opened instance of the log.
struct StreamCursor {
    reader: BufReader<File>,
    identity: Option<FileIdentity>,
    offset: u64,
    last_size: u64,
    /// Bytes of a physical line whose newline has not been written yet.
    line: Vec<u8>,
    /// Idle polls seen while `line` was waiting for its newline.
    held_polls: u32,
    decoder: LineDecoder,
}

impl StreamCursor {
    /// Open `path`, decode up to `backlog` records that precede the cursor, and
    /// position the cursor at the file's current end.
    async fn open(
        path: &Path,
        backlog: Option<usize>,
        max_pending_bytes: usize,
    ) -> Result<(Self, Vec<LogRecord>)> {
        let mut file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let size = metadata.len();

        let records = match backlog {
            Some(max_records) => read_backlog_from(&mut file, size, max_records)
                .await
                .unwrap_or_else(|e| {
                    debug!(path = %path.display(), error = %e, "backlog unavailable");
                    Vec::new()
                }),
            None => Vec::new(),
        };

        file.seek(SeekFrom::Start(size)).await?;

        let cursor = Self {
            reader: BufReader::new(file),
            identity: FileIdentity::of(&metadata),
            offset: size,
            last_size: size,
            line: Vec::new(),
            held_polls: 0,
            decoder: LineDecoder::new(max_pending_bytes),
        };
        Ok((cursor, records))
    }

    /// Whether `metadata`, taken from the path, describes a different file
    /// than the one this cursor has open.
    fn replaced_by(&self, metadata: &Metadata) -> bool {
        match (self.identity, FileIdentity::of(metadata)) {
            (Some(open), Some(current)) => open != current,
            _ => false,
        }
    }

    fn take_line(&mut self) -> String {
        let line = decode_lossy(&self.line);
        self.line.clear();
        self.held_polls = 0;
        line
    }
}

enum FollowState {
    WaitingForFile,
    Reopening { replay_backlog: bool },
    Streaming(StreamCursor),
}

/// Outcome of one streaming cycle.
enum Step {
    /// Progress was made; go again without sleeping.
    Continue,
    /// No new data; sleep until the next poll.
    Idle,
    /// The file shrank, vanished or was replaced.
    Rotated,
    Failed(crate::Error),
    Cancelled,
}

pub(crate) struct TailFollower {
    path: PathBuf,
    config: TailConfig,
    tx: mpsc::UnboundedSender<LogRecord>,
    shutdown_rx: broadcast::Receiver<()>,
    watcher: Option<FileWatcher>,
}

impl TailFollower {
    pub(crate) fn new(
        path: PathBuf,
        config: TailConfig,
        tx: mpsc::UnboundedSender<LogRecord>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            path,
            config,
            tx,
            shutdown_rx,
            watcher: None,
        }
    }

    /// Run until the consumer goes away or shutdown is signalled.
    pub(crate) async fn run(mut self) {
        let mut state = FollowState::WaitingForFile;

        loop {
            if self.cancelled() {
                break;
            }

            state = match state {
                FollowState::WaitingForFile => match self.wait_for_file().await {
                    Some(next) => next,
                    None => break,
                },

                FollowState::Reopening { replay_backlog } => {
                    self.refresh_watcher();
                    let backlog = replay_backlog.then_some(self.config.backlog_max_records);

                    match StreamCursor::open(&self.path, backlog, self.config.max_pending_bytes)
                        .await
                    {
                        Ok((cursor, records)) => {
                            info!(
                                path = %self.path.display(),
                                offset = cursor.offset,
                                backlog = records.len(),
                                "streaming event log"
                            );
                            if !records.into_iter().all(|record| self.emit(record)) {
                                break;
                            }
                            FollowState::Streaming(cursor)
                        }
                        Err(e) => {
                            debug!(
                                path = %self.path.display(),
                                error = %e,
                                "failed to open event log"
                            );
                            if !self.pause(self.config.retry_pause()).await {
                                break;
                            }
                            FollowState::WaitingForFile
                        }
                    }
                }

                FollowState::Streaming(mut cursor) => match self.poll_cursor(&mut cursor).await {
                    Step::Continue => FollowState::Streaming(cursor),
                    Step::Idle => {
                        if !self.idle(self.config.poll_interval()).await {
                            break;
                        }
                        FollowState::Streaming(cursor)
                    }
                    Step::Rotated => {
                        info!(
                            path = %self.path.display(),
                            "event log truncated or rotated, reopening"
                        );
                        FollowState::Reopening {
                            replay_backlog: true,
                        }
                    }
                    Step::Failed(e) => {
                        warn!(
                            path = %self.path.display(),
                            error = %e,
                            "read failed, retrying after pause"
                        );
                        drop(cursor);
                        if !self.pause(self.config.retry_pause()).await {
                            break;
                        }
                        FollowState::Reopening {
                            replay_backlog: false,
                        }
                    }
                    Step::Cancelled => break,
                },
            };
        }

        debug!(path = %self.path.display(), "follower stopped");
    }

    /// One cycle of waiting for the log to appear; `None` if cancelled.
    async fn wait_for_file(&mut self) -> Option<FollowState> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Some(FollowState::Reopening {
                replay_backlog: true,
            });
        }

        // Nothing reads notifications while waiting.
        self.watcher = None;
        trace!(path = %self.path.display(), "waiting for event log");
        if !self.pause(self.config.wait_interval()).await {
            return None;
        }
        self.adopt_env_override();
        Some(FollowState::WaitingForFile)
    }

    /// Read at most one physical line, or check the file when none is available.
    async fn poll_cursor(&mut self, cursor: &mut StreamCursor) -> Step {
        let read = match cursor.reader.read_until(b'\n', &mut cursor.line).await {
            Ok(read) => read,
            Err(e) => return Step::Failed(e.into()),
        };

        if read > 0 {
            cursor.offset += read as u64;
            // Having read up to `offset`, the file was at least that large.
            cursor.last_size = cursor.last_size.max(cursor.offset);
            if cursor.line.last() != Some(&b'\n') {
                // The writer is mid-line; wait for the rest.
                cursor.held_polls = 0;
                return Step::Continue;
            }
            let line = cursor.take_line();
            return self.decode_and_emit(cursor, &line);
        }

        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Step::Rotated,
            Err(e) => return Step::Failed(e.into()),
        };

        let current_size = metadata.len();
        if detect_file_truncation(current_size, cursor.last_size) || cursor.replaced_by(&metadata)
        {
            return Step::Rotated;
        }
        cursor.last_size = current_size;

        if !cursor.line.is_empty() {
            if cursor.held_polls == 0 {
                cursor.held_polls += 1;
            } else {
                // The newline never came; take the fragment as it is.
                let line = cursor.take_line();
                return self.decode_and_emit(cursor, &line);
            }
        }

        Step::Idle
    }

    fn decode_and_emit(&self, cursor: &mut StreamCursor, line: &str) -> Step {
        match cursor.decoder.push_line(line) {
            Some(record) => {
                if self.emit(record) {
                    Step::Continue
                } else {
                    Step::Cancelled
                }
            }
            None => Step::Continue,
        }
    }

    /// Forward a record; `false` once the consumer is gone.
    fn emit(&self, record: LogRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    fn cancelled(&mut self) -> bool {
        if self.tx.is_closed() {
            return true;
        }
        !matches!(
            self.shutdown_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    /// Switch to the environment-provided path if it has appeared or changed.
    ///
    /// Only consulted while the current path is missing.
    fn adopt_env_override(&mut self) {
        let Some(env_path) = self.config.env_var.as_deref().and_then(env_override) else {
            return;
        };
        if env_path != self.path {
            info!(
                from = %self.path.display(),
                to = %env_path.display(),
                "event log path overridden by environment"
            );
            self.path = env_path;
        }
    }

    /// Make sure change notifications, if enabled, follow the current path.
    fn refresh_watcher(&mut self) {
        if !self.config.watch_events {
            return;
        }
        if self
            .watcher
            .as_ref()
            .is_some_and(|watcher| watcher.file_path() == self.path)
        {
            return;
        }

        self.watcher = match FileWatcher::new(&self.path).and_then(|mut watcher| {
            watcher.start_watching()?;
            Ok(watcher)
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                debug!(
                    path = %self.path.display(),
                    error = %e,
                    "change notifications unavailable, polling only"
                );
                None
            }
        };
    }

    /// Sleep for `duration`; `false` if cancelled meanwhile.
    async fn pause(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown_rx.recv() => false,
            _ = self.tx.closed() => false,
        }
    }

    /// Like [`pause`](Self::pause), but a change to the log ends the sleep early.
    async fn idle(&mut self, duration: Duration) -> bool {
        let Some(watcher) = self.watcher.as_mut() else {
            return self.pause(duration).await;
        };

        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = watcher.changed() => true,
            _ = self.shutdown_rx.recv() => false,
            _ = self.tx.closed() => false,
        }
    }
}
