//! Stability detection: deciding when a file has finished being written.
//!
//! A file is stable once its size (and, above [`HASH_THRESHOLD_BYTES`], a fingerprint of its
//! head and tail) has not changed for a required duration. The duration is size-tiered: files at
//! or above the configured large-file threshold wait the extended (video) duration.
//!
//! The fingerprint covers only the first and last chunk of the file. It catches rewrites at a
//! constant size near either end, not changes confined to the middle.
//!
//! A file that disappears after polling has started is reported as [`Stability::Vanished`] and
//! counts as settled: it is assumed to have been consumed elsewhere. Callers re-validate the
//! path afterwards, so a vanished file is never uploaded.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::StabilitySettings;

const MIB: u64 = 1024 * 1024;

/// Files larger than this are also fingerprinted on every poll.
pub const HASH_THRESHOLD_BYTES: u64 = 10 * MIB;

/// Upper bound of each fingerprinted chunk.
pub const FINGERPRINT_CHUNK_BYTES: u64 = MIB;

/// Source of size and content observations for a path.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait FileProbe: Send + Sync {
    /// Current size, or `None` if the path no longer exists.
    async fn size(&self, path: &Path) -> io::Result<Option<u64>>;

    /// Fingerprint of the head and tail of a file of `size` bytes, or `None` if it is gone.
    async fn fingerprint(&self, path: &Path, size: u64) -> io::Result<Option<String>>;
}

/// [`FileProbe`] backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

#[async_trait]
impl FileProbe for FsProbe {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fingerprint(&self, path: &Path, size: u64) -> io::Result<Option<String>> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let chunk = FINGERPRINT_CHUNK_BYTES.min(size / 4) as usize;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; chunk];

        let head = read_up_to(&mut file, &mut buf).await?;
        hasher.update(&buf[..head]);

        file.seek(SeekFrom::Start(size.saturating_sub(chunk as u64)))
            .await?;
        let tail = read_up_to(&mut file, &mut buf).await?;
        hasher.update(&buf[..tail]);

        Ok(Some(format!("{:x}", hasher.finalize())))
    }
}

async fn read_up_to(file: &mut tokio::fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Timing parameters of a stability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub check_interval: Duration,
    pub base_wait: Duration,
    pub extended_wait: Duration,
    /// Size in MiB at or above which `extended_wait` applies.
    pub large_file_threshold_mb: u64,
}

impl StabilityPolicy {
    pub fn required_wait(&self, size_bytes: u64) -> Duration {
        let size_mb = size_bytes as f64 / MIB as f64;
        if size_mb >= self.large_file_threshold_mb as f64 {
            self.extended_wait
        } else {
            self.base_wait
        }
    }
}

impl From<&StabilitySettings> for StabilityPolicy {
    fn from(settings: &StabilitySettings) -> Self {
        Self {
            check_interval: settings.check_interval(),
            base_wait: settings.base_wait(),
            extended_wait: settings.extended_wait(),
            large_file_threshold_mb: settings.min_video_wait_size_mb,
        }
    }
}

/// Outcome of waiting on a path.
#[derive(Debug)]
pub enum Stability {
    /// Unchanged for the required duration.
    Stable { size: u64 },
    /// Disappeared while being polled.
    Vanished,
    /// Did not exist when the check started.
    Missing,
    /// An I/O error other than not-found aborted the check.
    Failed(io::Error),
}

impl Stability {
    /// Whether the check settled. `Vanished` counts as settled, `Missing` and `Failed` do not.
    pub fn is_settled(&self) -> bool {
        matches!(self, Stability::Stable { .. } | Stability::Vanished)
    }
}

pub struct StabilityDetector<P = FsProbe> {
    probe: P,
    policy: StabilityPolicy,
}

impl StabilityDetector<FsProbe> {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self::with_probe(FsProbe, policy)
    }
}

impl<P: FileProbe> StabilityDetector<P> {
    pub fn with_probe(probe: P, policy: StabilityPolicy) -> Self {
        Self { probe, policy }
    }

    pub async fn is_stable(&self, path: &Path) -> bool {
        self.wait_for_stability(path).await.is_settled()
    }

    /// Polls `path` until it is stable, vanishes, or an I/O error occurs.
    pub async fn wait_for_stability(&self, path: &Path) -> Stability {
        let mut last_size = match self.probe.size(path).await {
            Ok(Some(size)) => size,
            Ok(None) => {
                debug!(path = %path.display(), "File no longer exists at start of stability check");
                return Stability::Missing;
            }
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "Could not stat file for stability check");
                return Stability::Failed(e);
            }
        };
        let mut last_hash = match self.observe_hash(path, last_size).await {
            Ok(Some(hash)) => hash,
            Ok(None) => return Stability::Vanished,
            Err(e) => return Stability::Failed(e),
        };
        debug!(path = %path.display(), size = last_size, "Starting stability check");

        let mut stable_since: Option<Instant> = None;
        loop {
            tokio::time::sleep(self.policy.check_interval).await;

            let current_size = match self.probe.size(path).await {
                Ok(Some(size)) => size,
                Ok(None) => {
                    debug!(path = %path.display(), "File disappeared during stability check");
                    return Stability::Vanished;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = ?e, "Could not stat file during stability check");
                    return Stability::Failed(e);
                }
            };
            let current_hash = match self.observe_hash(path, current_size).await {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    debug!(path = %path.display(), "File disappeared while fingerprinting");
                    return Stability::Vanished;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = ?e, "Could not fingerprint file during stability check");
                    return Stability::Failed(e);
                }
            };

            if current_size != last_size || current_hash != last_hash {
                debug!(
                    path = %path.display(),
                    from = last_size,
                    to = current_size,
                    "File changed, resetting stability timer"
                );
                last_size = current_size;
                last_hash = current_hash;
                stable_since = None;
                continue;
            }

            let since = *stable_since.get_or_insert_with(|| {
                debug!(path = %path.display(), size = current_size, "File unchanged, starting stability timer");
                Instant::now()
            });
            let required = self.policy.required_wait(current_size);
            let elapsed = since.elapsed();
            if elapsed >= required {
                debug!(
                    path = %path.display(),
                    size = current_size,
                    stable_for = ?elapsed,
                    "File is stable"
                );
                return Stability::Stable { size: current_size };
            }
        }
    }

    /// `Ok(Some(None))` for files below the hash threshold, `Ok(None)` if the file vanished.
    async fn observe_hash(&self, path: &Path, size: u64) -> io::Result<Option<Option<String>>> {
        if size <= HASH_THRESHOLD_BYTES {
            return Ok(Some(None));
        }
        Ok(self.probe.fingerprint(path, size).await?.map(Some))
    }
}
