//! Status-event definitions and the process-wide fan-out bus.

pub mod bus;
pub mod event;

pub use {
    bus::{EventBus, HEARTBEAT_INTERVAL, OBSERVER_BUFFER, ObserverId},
    event::{CheckProgress, Event, Progress},
};
