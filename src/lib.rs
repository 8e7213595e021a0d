//! Real-time streaming of an intrusion-detection event log (Suricata `eve.json`).
//!
//! The log is located, its most recent records are replayed as a backlog,
//! and the file is then followed as it grows. Each complete JSON value in the
//! file becomes one [`LogRecord`], whether it was written as a single line,
//! spread over several lines, or as an element of one top-level array.
//! Truncation and rotation are detected and followed; a file that does not
//! exist yet is waited for.
//!
//! # Example
//!
//! ```rust,no_run
//! use eve_tail::watch_log;
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut stream = watch_log("/var/log/suricata/eve.json").await?;
//!
//!     while let Some(record) = stream.next().await {
//!         println!("{}", record["event_type"]);
//!     }
//!
//!     Ok(())
//! }
//! ```

mod config;
mod decoder;
mod error;
mod follower;
mod publisher;
mod reader;
mod resolver;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

pub use config::TailConfig;
pub use decoder::{
    DEFAULT_MAX_PENDING_BYTES, LineDecoder, LogRecord, ParseOutcome, PendingBuffer, try_parse,
};
pub use error::{Error, Result};
pub use publisher::{DEFAULT_PUBLISH_CAPACITY, EventPublisher, EventSubscriber};
pub use reader::{BACKLOG_WINDOW, read_backlog};
pub use resolver::{
    DEFAULT_EVE_PATH, EVE_PATH_ENV, WINDOWS_CANDIDATES, env_override, first_existing,
    path_from_file_url, resolve_path,
};
pub use stream::{LogStream, Subscription};

use std::path::Path;

/// Creates a stream that follows the event log at `path` with default settings.
///
/// # Example
///
/// ```rust,no_run
/// use eve_tail::watch_log;
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = watch_log("eve.json").await?;
///
///     while let Some(record) = stream.next().await {
///         println!("{}", record);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn watch_log<P: AsRef<Path>>(path: P) -> Result<LogStream> {
    LogStream::new(TailConfig::default().with_path(path.as_ref())).await
}

/// Creates a stream configured by `config`.
pub async fn watch_events(config: TailConfig) -> Result<LogStream> {
    LogStream::new(config).await
}
