//! User-facing upload notifications, throttled into time-based batches.
//!
//! The processor reports every upload start and success to a [`NotificationThrottle`]; the
//! throttle forwards at most one "started" event per session and coalesces successes into
//! `notify_success_batch(count)` calls no more often than the configured batch timeout.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::config::NotificationSettings;
use crate::dedup::lock;

/// Delivery target for notifications.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Notifier: Send + Sync {
    fn notify_start(&self);

    fn notify_success_batch(&self, count: usize);
}

/// Notifier that only emits tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_start(&self) {
        info!("Uploading assets...");
    }

    fn notify_success_batch(&self, count: usize) {
        if count == 1 {
            info!(count, "1 file uploaded to Immich");
        } else {
            info!(count, "{count} files uploaded to Immich");
        }
    }
}

#[derive(Debug)]
struct ThrottleState {
    session_started: bool,
    pending: usize,
    last_batch: Instant,
}

pub struct NotificationThrottle {
    notifier: Arc<dyn Notifier>,
    enabled: bool,
    batch_timeout: Duration,
    state: Mutex<ThrottleState>,
}

impl NotificationThrottle {
    pub fn new(notifier: Arc<dyn Notifier>, settings: &NotificationSettings) -> Self {
        Self::with_timeout(notifier, settings.enabled, settings.batch_timeout())
    }

    pub fn with_timeout(notifier: Arc<dyn Notifier>, enabled: bool, batch_timeout: Duration) -> Self {
        Self {
            notifier,
            enabled,
            batch_timeout,
            state: Mutex::new(ThrottleState {
                session_started: false,
                pending: 0,
                last_batch: Instant::now(),
            }),
        }
    }

    /// A throttle that never notifies.
    pub fn disabled() -> Self {
        Self::with_timeout(Arc::new(LogNotifier), false, Duration::ZERO)
    }

    pub fn upload_started(&self) {
        if !self.enabled {
            return;
        }
        let mut state = lock(&self.state);
        if !state.session_started {
            state.session_started = true;
            drop(state);
            self.notifier.notify_start();
        }
    }

    pub fn upload_succeeded(&self) {
        if !self.enabled {
            return;
        }
        let mut state = lock(&self.state);
        state.pending += 1;
        if state.last_batch.elapsed() >= self.batch_timeout {
            let count = Self::take_pending(&mut state);
            drop(state);
            self.deliver(count);
        }
    }

    /// Delivers any successes still waiting for their batch window.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }
        let mut state = lock(&self.state);
        if state.pending > 0 {
            let count = Self::take_pending(&mut state);
            drop(state);
            self.deliver(count);
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending
    }

    fn take_pending(state: &mut ThrottleState) -> usize {
        state.last_batch = Instant::now();
        std::mem::take(&mut state.pending)
    }

    fn deliver(&self, count: usize) {
        debug!(count, "Sending upload notification");
        self.notifier.notify_success_batch(count);
    }
}
