//! Handling of individual filesystem events.
//!
//! Each event path is claimed in the [`InFlight`] set, waited on by the [`StabilityDetector`],
//! re-captured and validated, then handed to the ready callback. Checks run as tokio tasks and at
//! most `max_concurrent_checks` of them poll at once; the claim is taken before waiting for a
//! permit so duplicate events are dropped while a check is queued.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dedup::{InFlight, InFlightGuard};
use crate::file_record::FileRecord;
use crate::stability::{FileProbe, FsProbe, Stability, StabilityDetector, StabilityPolicy};

/// Receives records that are stable and valid for processing.
pub type ReadyCallback = Arc<dyn Fn(FileRecord) + Send + Sync>;

pub struct FileEventHandler<P = FsProbe> {
    config: Arc<Config>,
    detector: Arc<StabilityDetector<P>>,
    in_flight: Arc<InFlight>,
    permits: Arc<Semaphore>,
    on_ready: ReadyCallback,
}

impl FileEventHandler<FsProbe> {
    pub fn new(config: Arc<Config>, on_ready: ReadyCallback) -> Self {
        let detector = StabilityDetector::new(StabilityPolicy::from(&config.stability));
        Self::with_detector(config, detector, InFlight::new(), on_ready)
    }
}

impl<P: FileProbe + 'static> FileEventHandler<P> {
    pub fn with_detector(
        config: Arc<Config>,
        detector: StabilityDetector<P>,
        in_flight: Arc<InFlight>,
        on_ready: ReadyCallback,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.stability.max_concurrent_checks.max(1)));
        Self {
            config,
            detector: Arc::new(detector),
            in_flight,
            permits,
            on_ready,
        }
    }

    pub fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }

    /// Starts a stability check for `path` unless one is already running for it.
    ///
    /// Returns the spawned task, or `None` when the event was discarded as a duplicate.
    pub fn handle(&self, path: &Path) -> Option<JoinHandle<()>> {
        let path = absolute(path);
        let guard = self.in_flight.try_claim(&path)?;
        debug!(path = %path.display(), "File event detected");

        let config = Arc::clone(&self.config);
        let detector = Arc::clone(&self.detector);
        let permits = Arc::clone(&self.permits);
        let on_ready = Arc::clone(&self.on_ready);

        Some(tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(path = %path.display(), error = ?e, "Stability check pool closed");
                    return;
                }
            };
            check_and_dispatch(&config, &detector, guard, &on_ready).await;
        }))
    }
}

async fn check_and_dispatch<P: FileProbe>(
    config: &Config,
    detector: &StabilityDetector<P>,
    guard: InFlightGuard,
    on_ready: &ReadyCallback,
) {
    let path = guard.path();
    match detector.wait_for_stability(path).await {
        Stability::Stable { .. } | Stability::Vanished => {
            let record = FileRecord::capture(path);
            match record.validate(config) {
                Ok(()) => {
                    info!(%record, "New file ready for processing");
                    on_ready(record);
                }
                Err(reason) => {
                    debug!(path = %path.display(), %reason, "File not valid for processing");
                }
            }
        }
        Stability::Missing => {
            debug!(path = %path.display(), "File missing before stability check");
        }
        Stability::Failed(e) => {
            warn!(path = %path.display(), error = ?e, "File did not stabilize");
        }
    }
    drop(guard);
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
