//! Filesystem notifications used to wake the follower before its next poll.

use crate::error::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Watches the directory containing the log and reports events for the log itself.
pub(crate) struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    file_path: PathBuf,
    file_name: String,
}

impl FileWatcher {
    /// Creates a new file watcher for the specified path.
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            file_path,
            file_name,
        })
    }

    /// Starts watching the parent directory, so creation and rename are seen too.
    pub(crate) fn start_watching(&mut self) -> Result<()> {
        let watch_path = watch_dir(&self.file_path);
        self.watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Returns the next file system event.
    pub(crate) async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        self.receiver.recv().await
    }

    /// Waits until an event touches the watched file.
    ///
    /// Never completes once the notification channel has closed. Cancel safe.
    pub(crate) async fn changed(&mut self) {
        loop {
            match self.next_event().await {
                Some(Ok(event)) if is_event_relevant_to_file(&event, &self.file_name) => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => tracing::trace!(error = %e, "ignoring watcher error"),
                None => std::future::pending::<()>().await,
            }
        }
    }

    pub(crate) fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Directory to watch for `file_path`; a bare file name means the current directory.
fn watch_dir(file_path: &Path) -> &Path {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
