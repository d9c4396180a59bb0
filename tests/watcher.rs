use immich_watch::config::Config;
use immich_watch::events::ReadyCallback;
use immich_watch::file_record::FileRecord;
use immich_watch::watcher::FileWatcher;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn config(root: &TempDir) -> (Arc<Config>, std::path::PathBuf) {
    let watch = root.path().join("drop");
    std::fs::create_dir_all(&watch).unwrap();
    let mut config = Config::new(
        "http://localhost",
        "key",
        vec![watch.clone()],
        root.path().join("archive"),
    );
    config.stability.wait_seconds = 1;
    config.stability.video_wait_seconds = 1;
    config.stability.check_interval_seconds = 0.1;
    (Arc::new(config), watch)
}

fn recorder() -> (ReadyCallback, Arc<Mutex<Vec<FileRecord>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Arc::new(move |r| sink.lock().unwrap().push(r)), seen)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_scans_existing_files() {
    let root = TempDir::new().unwrap();
    let (config, watch) = config(&root);
    std::fs::write(watch.join("old.jpg"), b"jpeg").unwrap();
    std::fs::write(watch.join("old.txt"), b"text").unwrap();
    let (on_ready, seen) = recorder();

    let mut watcher = FileWatcher::new(config, on_ready);
    watcher.start().await.expect("watcher starts");
    assert!(watcher.is_watching());
    watcher.stop().await;
    assert!(!watcher.is_watching());

    let names: Vec<_> = seen.lock().unwrap().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, vec!["old.jpg"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_file_is_reported_after_it_settles() {
    let root = TempDir::new().unwrap();
    let (config, watch) = config(&root);
    let (on_ready, seen) = recorder();

    let mut watcher = FileWatcher::new(config, on_ready);
    watcher.start().await.expect("watcher starts");
    std::fs::write(watch.join("new.png"), b"png bytes").unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while seen.lock().unwrap().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    watcher.stop().await;

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty(), "watcher never reported new.png");
    assert!(seen.iter().all(|r| r.name == "new.png"));
}
