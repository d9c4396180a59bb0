//! Filesystem subscription: forwards create/modify events from `notify` to the event handler.

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::WatchError;
use crate::events::{FileEventHandler, ReadyCallback};
use crate::scanner::DirectoryScanner;

/// Watches the configured roots and runs the initial scan.
pub struct FileWatcher {
    config: Arc<Config>,
    on_ready: ReadyCallback,
    handler: Arc<FileEventHandler>,
    watcher: Option<RecommendedWatcher>,
    dispatcher: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn new(config: Arc<Config>, on_ready: ReadyCallback) -> Self {
        let handler = Arc::new(FileEventHandler::new(
            Arc::clone(&config),
            Arc::clone(&on_ready),
        ));
        Self {
            config,
            on_ready,
            handler,
            watcher: None,
            dispatcher: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Subscribes to every existing watch root, then scans files already present.
    ///
    /// Idempotent while running. Missing roots are skipped with a warning.
    pub async fn start(&mut self) -> Result<(), WatchError> {
        if self.is_watching() {
            return Ok(());
        }
        info!("Starting file watcher...");

        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths {
                        if tx.send(path).is_err() {
                            debug!("Event dispatcher gone, dropping filesystem event");
                        }
                    }
                }
                Err(e) => error!(error = ?e, "Watch error"),
            },
            NotifyConfig::default(),
        )
        .map_err(WatchError::Create)?;

        let mode = if self.config.watch_recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        for dir in &self.config.watch_directories {
            if !dir.exists() {
                warn!(path = %dir.display(), "Watch directory does not exist");
                continue;
            }
            watcher
                .watch(dir, mode)
                .map_err(|source| WatchError::Watch {
                    path: dir.clone(),
                    source,
                })?;
            info!(path = %dir.display(), recursive = self.config.watch_recursive, "Watching directory");
        }

        let handler = Arc::clone(&self.handler);
        self.dispatcher = Some(tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                if path.is_dir() {
                    continue;
                }
                handler.handle(&path);
            }
            debug!("Event dispatcher stopped");
        }));
        self.watcher = Some(watcher);
        info!("File watcher started");

        let scanner = DirectoryScanner::new(Arc::clone(&self.config));
        let on_ready = Arc::clone(&self.on_ready);
        let scan = tokio::task::spawn_blocking(move || scanner.scan_all(&*on_ready));
        if let Err(e) = scan.await {
            error!(error = ?e, "Initial scan aborted");
        }
        Ok(())
    }

    /// Drops the subscription and waits for the dispatcher to drain.
    ///
    /// Stability checks already spawned run to completion on their own.
    pub async fn stop(&mut self) {
        let Some(watcher) = self.watcher.take() else {
            return;
        };
        info!("Stopping file watcher...");
        drop(watcher);
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                error!(error = ?e, "Event dispatcher panicked");
            }
        }
        info!("File watcher stopped");
    }
}
