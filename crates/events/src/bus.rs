//! Fan-out of status events to dynamically attached observers.
//!
//! Publication is non-blocking: each observer gets a bounded channel, a full
//! or closed channel never stalls delivery to the others or the publishing
//! job loop. Events published by one task arrive at every observer in
//! publication order, which gives per-session ordering for free (each
//! session publishes from a single task).

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::event::Event;

/// Per-observer channel capacity; a consumer this far behind is dropped.
pub const OBSERVER_BUFFER: usize = 256;

/// Idle keep-alive interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

pub type ObserverId = u64;

#[derive(Default)]
pub struct EventBus {
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a long-lived observer.
    ///
    /// `snapshot` is replayed into the channel before any live event so a
    /// late observer reconstructs current state without polling.
    pub fn attach(&self, snapshot: Vec<Event>) -> (ObserverId, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        for event in snapshot {
            // Snapshot cannot overflow a fresh channel unless it is larger
            // than the buffer itself; drop the tail in that case.
            let _ = tx.try_send(event);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write().insert(id, tx);
        debug!(observer = id, "observer attached");
        (id, rx)
    }

    /// Remove an observer; idempotent.
    pub fn detach(&self, id: ObserverId) {
        if self.write().remove(&id).is_some() {
            debug!(observer = id, "observer detached");
        }
    }

    pub fn observer_count(&self) -> usize {
        self.read().len()
    }

    /// Deliver an event to every attached observer, best-effort.
    pub fn publish(&self, event: Event) {
        let mut dead = Vec::new();
        {
            let observers = self.read();
            for (id, tx) in observers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {},
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Slow consumer: skip this event for it, keep going.
                        warn!(observer = id, "observer lagging, dropping event");
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }
        if !dead.is_empty() {
            let mut observers = self.write();
            for id in dead {
                observers.remove(&id);
                debug!(observer = id, "observer gone, removed");
            }
        }
    }

    /// Log an operator-facing line and mirror it to observers.
    pub fn publish_log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.publish(Event::Log { message });
    }

    /// Emit [`Event::Heartbeat`] every [`HEARTBEAT_INTERVAL`] until the
    /// returned token is cancelled.
    pub fn start_heartbeat(self: &std::sync::Arc<Self>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let bus = std::sync::Arc::clone(self);
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        bus.publish(Event::Heartbeat { ts: chrono::Utc::now().timestamp_millis() });
                    },
                }
            }
        });
        cancel
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ObserverId, mpsc::Sender<Event>>> {
        self.observers.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ObserverId, mpsc::Sender<Event>>> {
        self.observers.write().unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn log(msg: &str) -> Event {
        Event::Log {
            message: msg.into(),
        }
    }

    #[tokio::test]
    async fn snapshot_is_replayed_before_live_events() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.attach(vec![log("snap-1"), log("snap-2")]);
        bus.publish(log("live"));

        for expected in ["snap-1", "snap-2", "live"] {
            match rx.recv().await.unwrap() {
                Event::Log { message } => assert_eq!(message, expected),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn slow_observer_does_not_block_others() {
        let bus = EventBus::new();
        let (_, mut fast) = bus.attach(Vec::new());
        let (_, _slow) = bus.attach(Vec::new());

        // Overflow the slow observer's buffer; the fast one must still see
        // every event it has room for.
        for i in 0..(OBSERVER_BUFFER + 10) {
            bus.publish(log(&format!("ev-{i}")));
            if i < 5 {
                let got = fast.recv().await.unwrap();
                match got {
                    Event::Log { message } => assert_eq!(message, format!("ev-{i}")),
                    other => panic!("unexpected event: {other:?}"),
                }
            }
        }
        assert_eq!(bus.observer_count(), 2);
    }

    #[tokio::test]
    async fn dropped_observer_is_pruned_on_publish() {
        let bus = EventBus::new();
        let (id, rx) = bus.attach(Vec::new());
        drop(rx);
        bus.publish(log("x"));
        assert_eq!(bus.observer_count(), 0);
        // Detaching again is a no-op.
        bus.detach(id);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reaches_attached_observers() {
        let bus = std::sync::Arc::new(EventBus::new());
        let (_, mut rx) = bus.attach(Vec::new());
        let cancel = bus.start_heartbeat();

        // Paused time fast-forwards to the next tick while the test awaits.
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                Event::Heartbeat { ts } => assert!(ts > 0),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_observer() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.attach(Vec::new());
        for i in 0..20 {
            bus.publish(log(&format!("{i}")));
        }
        for i in 0..20 {
            match rx.recv().await.unwrap() {
                Event::Log { message } => assert_eq!(message, format!("{i}")),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
