use immich_watch::stats::ProcessingStats;
use std::sync::Arc;

#[test]
fn counters_start_at_zero_and_increment() {
    let stats = ProcessingStats::new();
    let empty = stats.snapshot();
    assert_eq!(
        (empty.total_files, empty.successful_uploads, empty.failed_uploads, empty.skipped_files, empty.archived_files),
        (0, 0, 0, 0, 0)
    );

    stats.increment_total();
    stats.increment_total();
    stats.increment_success();
    stats.increment_failed();
    stats.increment_skipped();
    stats.increment_archived();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.total_files, 2);
    assert_eq!(snapshot.successful_uploads, 1);
    assert_eq!(snapshot.failed_uploads, 1);
    assert_eq!(snapshot.skipped_files, 1);
    assert_eq!(snapshot.archived_files, 1);
}

#[test]
fn concurrent_increments_are_not_lost() {
    let stats = Arc::new(ProcessingStats::new());
    std::thread::scope(|s| {
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            s.spawn(move || {
                for _ in 0..1000 {
                    stats.increment_total();
                }
            });
        }
    });
    assert_eq!(stats.snapshot().total_files, 8000);
}

#[test]
fn summary_has_expected_shape() {
    let stats = ProcessingStats::new();
    stats.increment_total();
    stats.increment_success();
    stats.increment_archived();

    let summary = stats.summary();
    assert!(
        summary.starts_with(
            "Processing Stats - Total: 1, Success: 1, Failed: 0, Skipped: 0, Archived: 1, Runtime: "
        ),
        "{summary}"
    );
    assert!(summary.ends_with('s'));
}
