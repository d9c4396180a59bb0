//! Shared sets that keep the pipeline from handling the same file twice.
//!
//! [`InFlight`] debounces concurrent stability checks per path; [`SeenFiles`] remembers dedup keys
//! of records already submitted for upload during this process's lifetime. Both are plain
//! components injected where needed so tests can build isolated instances.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Paths that currently have a stability check running.
#[derive(Debug, Default)]
pub struct InFlight {
    paths: Mutex<HashSet<PathBuf>>,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims `path`, or returns `None` if another check already holds it.
    ///
    /// The claim is released when the returned guard is dropped, including during unwinding.
    pub fn try_claim(self: &Arc<Self>, path: &Path) -> Option<InFlightGuard> {
        if !lock(&self.paths).insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            owner: Arc::clone(self),
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        lock(&self.paths).contains(path)
    }

    pub fn len(&self) -> usize {
        lock(&self.paths).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases an [`InFlight`] claim on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    owner: Arc<InFlight>,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.owner.paths).remove(&self.path);
    }
}

/// Dedup keys seen during this run. Never persisted; a restart forgets them.
#[derive(Debug, Default)]
pub struct SeenFiles {
    keys: Mutex<HashSet<String>>,
}

impl SeenFiles {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks `key` as seen. Returns `false` if it already was.
    pub fn insert(&self, key: &str) -> bool {
        lock(&self.keys).insert(key.to_owned())
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.keys).contains(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        lock(&self.keys).remove(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
