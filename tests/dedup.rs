use immich_watch::dedup::{InFlight, SeenFiles};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

#[test]
fn in_flight_claim_is_exclusive_until_guard_drops() {
    let in_flight = InFlight::new();
    let path = Path::new("/watch/a.jpg");

    let guard = in_flight.try_claim(path).expect("first claim succeeds");
    assert!(in_flight.try_claim(path).is_none());
    assert!(in_flight.contains(path));
    assert!(in_flight.try_claim(Path::new("/watch/b.jpg")).is_some());

    drop(guard);
    assert!(!in_flight.contains(path));
    assert!(in_flight.try_claim(path).is_some());
}

#[test]
fn in_flight_claim_is_released_when_check_panics() {
    let in_flight = InFlight::new();
    let path = Path::new("/watch/panic.jpg");

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _guard = in_flight.try_claim(path).unwrap();
        panic!("stability check blew up");
    }));

    assert!(result.is_err());
    assert!(in_flight.is_empty());
}

#[test]
fn in_flight_claims_race_to_a_single_winner() {
    let in_flight = InFlight::new();
    let winners: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                s.spawn(move || {
                    let guard = in_flight.try_claim(Path::new("/watch/race.jpg"));
                    guard.map(|g| std::mem::forget(g)).is_some()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(winners.iter().filter(|w| **w).count(), 1);
}

#[test]
fn seen_files_insert_reports_first_sighting_only() {
    let seen = SeenFiles::new();
    assert!(seen.insert("/a.jpg_10_1.5"));
    assert!(!seen.insert("/a.jpg_10_1.5"));
    assert!(seen.insert("/a.jpg_11_1.5"));
    assert_eq!(seen.len(), 2);

    assert!(seen.remove("/a.jpg_10_1.5"));
    assert!(!seen.contains("/a.jpg_10_1.5"));
    assert!(seen.insert("/a.jpg_10_1.5"));
}
