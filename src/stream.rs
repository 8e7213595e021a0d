//! Stream of decoded records backed by a background follower task.

use crate::config::TailConfig;
use crate::decoder::LogRecord;
use crate::error::Result;
use crate::follower::TailFollower;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

/// A stream that tails the event log and yields each decoded record.
///
/// Yields the backlog first, then live records in file order. The stream
/// only ends after [`close`](Self::close) (or drop); I/O trouble is retried
/// by the background follower and never surfaces here.
pub struct LogStream {
    receiver: mpsc::UnboundedReceiver<LogRecord>,
    shutdown_tx: broadcast::Sender<()>,
    task_handle: JoinHandle<()>,
    path: PathBuf,
}

impl LogStream {
    /// Creates a new LogStream from `config` and starts following the log.
    pub async fn new(config: TailConfig) -> Result<Self> {
        config.validate()?;
        let path = config.resolve_path();

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let follower = TailFollower::new(path.clone(), config, tx, shutdown_rx);
        let task_handle = tokio::spawn(follower.run());

        Ok(LogStream {
            receiver: rx,
            shutdown_tx,
            task_handle,
            path,
        })
    }

    /// The log path resolved at construction.
    ///
    /// The follower may later switch to an environment-provided override.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Receive the next record.
    pub async fn recv(&mut self) -> Option<LogRecord> {
        self.receiver.recv().await
    }

    /// Ask the follower to stop. Safe to call any number of times.
    ///
    /// Records already queued can still be received; after that the stream ends.
    pub fn close(&self) {
        // Errors only mean the follower is already gone.
        let _ = self.shutdown_tx.send(());
    }

    /// Whether the follower task has exited and released the log file.
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }

    /// Deliver every record to `callback` on a separate task.
    pub fn subscribe<F>(self, mut callback: F) -> Subscription
    where
        F: FnMut(LogRecord) + Send + 'static,
    {
        let shutdown_tx = self.shutdown_tx.clone();
        let mut stream = self;
        let task = tokio::spawn(async move {
            while let Some(record) = stream.next().await {
                callback(record);
            }
        });

        Subscription { shutdown_tx, task }
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for LogStream {
    type Item = LogRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Handle for a callback registered with [`LogStream::subscribe`].
pub struct Subscription {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering records. Safe to call any number of times.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the delivery task to finish after [`cancel`](Self::cancel).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
