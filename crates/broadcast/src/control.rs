//! Operator controls shared between a job loop and the command surface.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use {
    tokio::sync::Notify,
    tokio_util::sync::CancellationToken,
};

/// How long a paused loop waits before re-checking its flags; a resume or
/// stop wakes it immediately via the notifier.
const PAUSE_POLL: Duration = Duration::from_secs(1);

/// Stop/pause state for one broadcast job.
///
/// `stop` wins over `pause`: a paused loop that gets a stop request must
/// observe it on its next wakeup, never sleep through it.
#[derive(Debug, Default)]
pub struct JobControl {
    stop: CancellationToken,
    paused: AtomicBool,
    wake: Notify,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; takes effect at the loop's next check point.
    pub fn request_stop(&self) {
        self.stop.cancel();
        // Wake a paused loop so the stop is seen promptly.
        self.wake.notify_waiters();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Completes once a stop has been requested.
    pub async fn stopped(&self) {
        self.stop.cancelled().await;
    }

    /// Mark paused; returns `false` if already paused.
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    /// Clear the pause; returns `false` if not paused.
    pub fn resume(&self) -> bool {
        let was_paused = self.paused.swap(false, Ordering::SeqCst);
        if was_paused {
            self.wake.notify_waiters();
        }
        was_paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Suspend while paused. Returns once unpaused or stop-requested; the
    /// caller must re-check [`Self::stop_requested`] afterwards.
    pub async fn wait_while_paused(&self) {
        while self.is_paused() && !self.stop_requested() {
            let _ = tokio::time::timeout(PAUSE_POLL, self.wake.notified()).await;
        }
    }
}
