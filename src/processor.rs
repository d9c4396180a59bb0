//! # processor: serial upload queue, worker and archival
//!
//! [`FileProcessor`] owns the single queue between detection and upload. Ready records are
//! [`submit`](FileProcessor::submit)ted from any task or thread; exactly one worker task drains
//! the queue, uploads each file through the injected [`Uploader`], and moves successfully uploaded
//! files into the archive directory.
//!
//! ## Lifecycle
//! - [`FileProcessor::new`] creates the archive directory (fatal on failure).
//! - [`FileProcessor::start`] checks server connectivity (fatal on failure) and spawns the worker.
//! - [`FileProcessor::stop`] pushes a shutdown marker, joins the worker for at most five seconds,
//!   closes the uploader and logs the final statistics.
//!
//! Per-file failures never escape the worker: they are logged and counted in [`ProcessingStats`].

use futures::FutureExt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dedup::{lock, SeenFiles};
use crate::error::ProcessorError;
use crate::events::ReadyCallback;
use crate::file_record::FileRecord;
use crate::notifications::NotificationThrottle;
use crate::stats::ProcessingStats;
use crate::uploader::Uploader;

const QUEUE_POLL: Duration = Duration::from_secs(1);
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Entry in the processing queue.
#[derive(Debug)]
pub enum QueueItem {
    File(FileRecord),
    /// Tells the worker to exit after the file it is currently handling.
    Shutdown,
}

/// State shared between the processor handle and its worker task.
struct Pipeline {
    config: Arc<Config>,
    uploader: Arc<dyn Uploader>,
    notifications: Arc<NotificationThrottle>,
    seen: Arc<SeenFiles>,
    stats: Arc<ProcessingStats>,
    running: AtomicBool,
}

pub struct FileProcessor {
    pipeline: Arc<Pipeline>,
    sender: Mutex<Option<UnboundedSender<QueueItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileProcessor {
    pub fn new(
        config: Arc<Config>,
        uploader: Arc<dyn Uploader>,
        notifications: Arc<NotificationThrottle>,
    ) -> Result<Self, ProcessorError> {
        Self::with_seen_files(config, uploader, notifications, SeenFiles::new())
    }

    /// Like [`FileProcessor::new`] but with an externally owned dedup set.
    pub fn with_seen_files(
        config: Arc<Config>,
        uploader: Arc<dyn Uploader>,
        notifications: Arc<NotificationThrottle>,
        seen: Arc<SeenFiles>,
    ) -> Result<Self, ProcessorError> {
        let archive = &config.archive_directory;
        std::fs::create_dir_all(archive).map_err(|source| {
            error!(path = %archive.display(), error = ?source, "Cannot create archive directory");
            ProcessorError::ArchiveDirectory {
                path: archive.clone(),
                source,
            }
        })?;
        info!(path = %archive.display(), "Archive directory ready");

        Ok(Self {
            pipeline: Arc::new(Pipeline {
                config,
                uploader,
                notifications,
                seen,
                stats: Arc::new(ProcessingStats::new()),
                running: AtomicBool::new(false),
            }),
            sender: Mutex::new(None),
            worker: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.pipeline.stats
    }

    pub fn seen_files(&self) -> &Arc<SeenFiles> {
        &self.pipeline.seen
    }

    /// Callback that submits ready records to this processor.
    pub fn ready_callback(self: &Arc<Self>) -> ReadyCallback {
        let processor = Arc::clone(self);
        Arc::new(move |record| processor.submit(record))
    }

    /// Verifies the server is reachable and spawns the worker. No-op if already running.
    pub async fn start(&self) -> Result<(), ProcessorError> {
        if self.is_running() {
            return Ok(());
        }
        info!("Starting file processor...");

        if !self.pipeline.uploader.test_connection().await {
            error!("Cannot connect to Immich server");
            return Err(ProcessorError::ServerUnreachable);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.sender) = Some(tx);
        self.pipeline.running.store(true, Ordering::SeqCst);
        let pipeline = Arc::clone(&self.pipeline);
        *lock(&self.worker) = Some(tokio::spawn(run_worker(pipeline, rx)));

        info!("File processor started");
        Ok(())
    }

    /// Queues `record` unless the processor is stopped or the same file was already submitted.
    pub fn submit(&self, record: FileRecord) {
        if !self.is_running() {
            warn!(path = %record.path.display(), "File processor is not running, ignoring file");
            return;
        }

        let key = record.dedup_key();
        if !self.pipeline.seen.insert(&key) {
            debug!(path = %record.path.display(), "File already processed, skipping");
            self.pipeline.stats.increment_skipped();
            return;
        }

        let path = record.path.clone();
        let sent = match lock(&self.sender).as_ref() {
            Some(tx) => tx.send(QueueItem::File(record)).is_ok(),
            None => false,
        };
        if sent {
            self.pipeline.stats.increment_total();
            debug!(path = %path.display(), "Added file to processing queue");
        } else {
            warn!(path = %path.display(), "Processing queue closed, ignoring file");
            self.pipeline.seen.remove(&key);
        }
    }

    /// Stops the worker after its current file, closes the uploader and logs final statistics.
    pub async fn stop(&self) {
        if !self.pipeline.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping file processor...");

        if let Some(tx) = lock(&self.sender).take() {
            let _ = tx.send(QueueItem::Shutdown);
        }
        let worker = lock(&self.worker).take();
        if let Some(mut handle) = worker {
            match timeout(WORKER_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = ?e, "File processor worker panicked"),
                Err(_) => {
                    warn!("File processor worker did not stop in time, aborting it");
                    handle.abort();
                }
            }
        }

        self.pipeline.uploader.close().await;
        self.pipeline.notifications.flush();
        info!("File processor stopped");
        info!("{}", self.pipeline.stats.summary());
    }
}

async fn run_worker(pipeline: Arc<Pipeline>, mut rx: UnboundedReceiver<QueueItem>) {
    info!("File processor worker started");
    while pipeline.running.load(Ordering::SeqCst) {
        match timeout(QUEUE_POLL, rx.recv()).await {
            Err(_) => continue,
            Ok(None) | Ok(Some(QueueItem::Shutdown)) => break,
            Ok(Some(QueueItem::File(record))) => pipeline.process_one(record).await,
        }
    }
    info!("File processor worker stopped");
}

impl Pipeline {
    async fn process_one(&self, record: FileRecord) {
        info!(path = %record.path.display(), "Processing file");
        let key = record.dedup_key();

        if let Err(reason) = record.validate(&self.config) {
            warn!(path = %record.path.display(), %reason, "File no longer valid, skipping");
            self.stats.increment_skipped();
            self.seen.remove(&key);
            return;
        }
        self.seen.insert(&key);
        self.notifications.upload_started();

        let outcome = AssertUnwindSafe(self.uploader.upload(&record))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                error!(path = %record.path.display(), "Uploader panicked while processing file");
                self.stats.increment_failed();
                return;
            }
        };

        if !result.success {
            error!(
                file = %record.name,
                message = %result.message,
                "Upload failed"
            );
            self.stats.increment_failed();
            return;
        }

        info!(file = %record.name, asset_id = ?result.asset_id, "Upload successful");
        self.stats.increment_success();
        self.notifications.upload_succeeded();

        match archive_file(&self.config.archive_directory, &record.path).await {
            Ok(target) => {
                self.stats.increment_archived();
                info!(file = %record.name, target = %target.display(), "File archived");
            }
            Err(e) => {
                error!(path = %record.path.display(), error = %e, "Failed to archive file");
                warn!(file = %record.name, "Upload successful but archiving failed");
            }
        }
    }
}

/// First free name for `source` inside `archive_dir`: the original file name, else
/// `stem_N.ext` with the smallest `N >= 1` not already taken.
pub fn resolve_archive_target(archive_dir: &Path, source: &Path) -> PathBuf {
    let name = source.file_name().unwrap_or(source.as_os_str());
    let target = archive_dir.join(name);
    if !target.exists() {
        return target;
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source.extension().map(|e| e.to_string_lossy().into_owned());
    let mut counter = 1u64;
    loop {
        let candidate = match &extension {
            Some(ext) => archive_dir.join(format!("{stem}_{counter}.{ext}")),
            None => archive_dir.join(format!("{stem}_{counter}")),
        };
        if !candidate.exists() {
            info!(
                name = %candidate.file_name().unwrap_or_default().to_string_lossy(),
                "Renamed archived file to avoid conflict"
            );
            return candidate;
        }
        counter += 1;
    }
}

/// Moves `source` into `archive_dir` under a conflict-free name and returns where it landed.
pub async fn archive_file(archive_dir: &Path, source: &Path) -> io::Result<PathBuf> {
    let target = resolve_archive_target(archive_dir, source);
    tokio::fs::rename(source, &target).await?;
    debug!(from = %source.display(), to = %target.display(), "Moved file to archive");
    Ok(target)
}
