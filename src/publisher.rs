//! In-process fan-out of one log stream to many subscribers.
//!
//! The follower has a single consumer. [`EventPublisher`] is that consumer
//! and re-broadcasts each record, so any number of subscribers can attach
//! without opening the log again. A subscriber that falls behind skips
//! records instead of holding the others back.

use crate::decoder::LogRecord;
use crate::error::{Error, Result};
use crate::stream::LogStream;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// Default number of records buffered per subscriber.
pub const DEFAULT_PUBLISH_CAPACITY: usize = 1024;

pub struct EventPublisher {
    // Only the forwarding task holds a strong sender, so subscribers see the
    // end of the stream once it stops.
    sender: broadcast::WeakSender<Arc<LogRecord>>,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl EventPublisher {
    /// Start forwarding records from `stream` to subscribers.
    pub fn spawn(stream: LogStream, capacity: usize) -> Self {
        let (forward, _) = broadcast::channel(capacity.max(1));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let sender = forward.downgrade();
        let mut stream = stream;
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    record = stream.next() => match record {
                        // No subscribers is not an error; the record is simply unseen.
                        Some(record) => { let _ = forward.send(Arc::new(record)); }
                        None => break,
                    },
                }
            }
            stream.close();
            tracing::debug!("publisher stopped");
        });

        Self {
            sender,
            shutdown_tx,
            task,
        }
    }

    /// Attach a subscriber that sees every record published from now on.
    pub fn subscribe(&self) -> Result<EventSubscriber> {
        let sender = self.sender.upgrade().ok_or(Error::StreamClosed)?;
        Ok(EventSubscriber {
            inner: BroadcastStream::new(sender.subscribe()),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .upgrade()
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Stop the upstream follower. Safe to call any number of times, from any
    /// number of detaching subscribers.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One subscriber's view of the published records.
pub struct EventSubscriber {
    inner: BroadcastStream<Arc<LogRecord>>,
}

impl Stream for EventSubscriber {
    type Item = Arc<LogRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(record))) => return Poll::Ready(Some(record)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "subscriber lagged, records skipped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
