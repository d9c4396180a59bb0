use async_trait::async_trait;
use immich_watch::config::Config;
use immich_watch::dedup::InFlight;
use immich_watch::events::{FileEventHandler, ReadyCallback};
use immich_watch::file_record::FileRecord;
use immich_watch::stability::{FileProbe, StabilityDetector, StabilityPolicy};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Reports whatever the real filesystem says, without fingerprinting.
struct SizeOnly;

#[async_trait]
impl FileProbe for SizeOnly {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>> {
        Ok(std::fs::metadata(path).ok().map(|m| m.len()))
    }

    async fn fingerprint(&self, _path: &Path, _size: u64) -> io::Result<Option<String>> {
        Ok(Some(String::new()))
    }
}

/// Sees the file once, then deletes it and reports it gone.
#[derive(Default)]
struct DeletedAfterFirstLook {
    looks: AtomicUsize,
}

#[async_trait]
impl FileProbe for DeletedAfterFirstLook {
    async fn size(&self, path: &Path) -> io::Result<Option<u64>> {
        if self.looks.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(std::fs::metadata(path).ok().map(|m| m.len()));
        }
        let _ = std::fs::remove_file(path);
        Ok(None)
    }

    async fn fingerprint(&self, _path: &Path, _size: u64) -> io::Result<Option<String>> {
        Ok(Some(String::new()))
    }
}

fn fast_policy() -> StabilityPolicy {
    StabilityPolicy {
        check_interval: Duration::from_millis(20),
        base_wait: Duration::from_millis(40),
        extended_wait: Duration::from_millis(40),
        large_file_threshold_mb: 100,
    }
}

fn handler(
    root: &TempDir,
) -> (
    FileEventHandler<SizeOnly>,
    Arc<Mutex<Vec<FileRecord>>>,
    std::path::PathBuf,
) {
    handler_with(root, SizeOnly)
}

fn handler_with<P: FileProbe + 'static>(
    root: &TempDir,
    probe: P,
) -> (
    FileEventHandler<P>,
    Arc<Mutex<Vec<FileRecord>>>,
    std::path::PathBuf,
) {
    let watch = root.path().join("drop");
    std::fs::create_dir_all(&watch).unwrap();
    let config = Arc::new(Config::new(
        "http://localhost",
        "key",
        vec![watch.clone()],
        root.path().join("archive"),
    ));
    let ready = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ready);
    let on_ready: ReadyCallback = Arc::new(move |record| sink.lock().unwrap().push(record));
    let detector = StabilityDetector::with_probe(probe, fast_policy());
    (
        FileEventHandler::with_detector(config, detector, InFlight::new(), on_ready),
        ready,
        watch,
    )
}

#[tokio::test]
async fn stable_valid_file_reaches_the_ready_callback() {
    let root = TempDir::new().unwrap();
    let (handler, ready, watch) = handler(&root);
    let path = watch.join("photo.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();

    let task = handler.handle(&path).expect("check started");
    task.await.unwrap();

    let ready = ready.lock().unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].name, "photo.jpg");
    assert!(handler.in_flight().is_empty());
}

#[tokio::test]
async fn duplicate_event_while_checking_is_discarded() {
    let root = TempDir::new().unwrap();
    let (handler, ready, watch) = handler(&root);
    let path = watch.join("photo.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();

    let first = handler.handle(&path).expect("first check started");
    assert!(handler.handle(&path).is_none());
    first.await.unwrap();

    assert_eq!(ready.lock().unwrap().len(), 1);
    // Released again once the first check finished.
    let again = handler.handle(&path).expect("claim released");
    again.await.unwrap();
    assert_eq!(ready.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn unsupported_or_vanished_files_never_become_ready() {
    let root = TempDir::new().unwrap();
    let (handler, ready, watch) = handler(&root);
    let notes = watch.join("notes.txt");
    std::fs::write(&notes, b"text").unwrap();

    handler.handle(&notes).unwrap().await.unwrap();
    handler.handle(&watch.join("missing.jpg")).unwrap().await.unwrap();

    assert!(ready.lock().unwrap().is_empty());
    assert!(handler.in_flight().is_empty());
}

#[tokio::test]
async fn file_removed_during_check_never_becomes_ready() {
    let root = TempDir::new().unwrap();
    let (handler, ready, watch) = handler_with(&root, DeletedAfterFirstLook::default());
    let path = watch.join("photo.jpg");
    std::fs::write(&path, b"jpeg bytes").unwrap();

    let task = handler.handle(&path).expect("check started");
    task.await.unwrap();

    assert!(!path.exists());
    assert!(ready.lock().unwrap().is_empty());
    assert!(handler.in_flight().is_empty());
}
