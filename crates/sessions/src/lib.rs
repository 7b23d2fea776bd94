//! Session lifecycle and the operator-facing engine API.
//!
//! [`SessionManager`] owns the session registry, drives one transport event
//! loop per session (with auto-reconnect), and exposes the operations an
//! outer surface builds on: broadcasts, number verification, observers,
//! reports, direct sends.

pub mod error;
pub mod manager;
pub mod session;

pub use {
    error::{Error, Result},
    manager::SessionManager,
    session::{SessionState, SessionSummary},
};
