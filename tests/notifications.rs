use immich_watch::config::NotificationSettings;
use immich_watch::notifications::{MockNotifier, NotificationThrottle};
use mockall::predicate::eq;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn start_is_notified_once_per_session() {
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_start().times(1).returning(|| ());
    let throttle = NotificationThrottle::with_timeout(Arc::new(notifier), true, Duration::from_secs(60));

    throttle.upload_started();
    throttle.upload_started();
}

#[test]
fn successes_are_batched_until_the_window_elapses() {
    let mut notifier = MockNotifier::new();
    notifier.expect_notify_success_batch().times(0);
    let throttle = NotificationThrottle::with_timeout(Arc::new(notifier), true, Duration::from_secs(3600));

    throttle.upload_succeeded();
    throttle.upload_succeeded();
    throttle.upload_succeeded();
    assert_eq!(throttle.pending_count(), 3);
}

#[test]
fn elapsed_window_delivers_each_success() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify_success_batch()
        .with(eq(1))
        .times(2)
        .returning(|_| ());
    let throttle = NotificationThrottle::with_timeout(Arc::new(notifier), true, Duration::ZERO);

    throttle.upload_succeeded();
    throttle.upload_succeeded();
    assert_eq!(throttle.pending_count(), 0);
}

#[test]
fn flush_delivers_pending_batch_once() {
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify_success_batch()
        .with(eq(2))
        .times(1)
        .returning(|_| ());
    let throttle = NotificationThrottle::with_timeout(Arc::new(notifier), true, Duration::from_secs(3600));

    throttle.upload_succeeded();
    throttle.upload_succeeded();
    throttle.flush();
    throttle.flush();
    assert_eq!(throttle.pending_count(), 0);
}

#[test]
fn disabled_throttle_never_notifies() {
    let notifier = MockNotifier::new();
    let settings = NotificationSettings {
        enabled: false,
        batch_timeout_seconds: 1,
    };
    let throttle = NotificationThrottle::new(Arc::new(notifier), &settings);

    throttle.upload_started();
    throttle.upload_succeeded();
    throttle.flush();
    assert_eq!(throttle.pending_count(), 0);
}
