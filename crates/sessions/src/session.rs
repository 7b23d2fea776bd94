//! Per-session state, mutated only by the manager under its lock.

use std::sync::{Arc, Mutex};

use {
    serde::Serialize,
    tokio_util::sync::CancellationToken,
};

use {
    wablast_broadcast::JobControl,
    wablast_common::{DeliveryRecord, Identity},
};

/// Connection phase of a managed session, driven by transport signals only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connecting or reconnecting; nothing is known yet.
    Initializing,
    /// A pairing code was issued and awaits confirmation on the device.
    AwaitingPairing,
    /// Connected and usable.
    Ready,
    /// Connection lost; a reconnect follows.
    Disconnected,
}

pub(crate) struct Session {
    pub state: SessionState,
    pub pairing_code: Option<String>,
    pub identity: Option<Identity>,
    pub broadcasting: bool,
    /// Present from broadcast acceptance (including the scheduled wait) until
    /// the job finishes; its presence is what `AlreadyRunning` checks.
    pub job: Option<Arc<JobControl>>,
    /// Present while a number check is walking its candidate list.
    pub check_stop: Option<CancellationToken>,
    /// Single-slot delivery report, cleared when a new job is accepted.
    pub report: Arc<Mutex<Vec<DeliveryRecord>>>,
    /// Cancels the transport event loop when the session is removed.
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Initializing,
            pairing_code: None,
            identity: None,
            broadcasting: false,
            job: None,
            check_stop: None,
            report: Arc::new(Mutex::new(Vec::new())),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.job.as_deref().is_some_and(JobControl::is_paused)
    }
}

/// Snapshot of one session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    pub broadcasting: bool,
    pub paused: bool,
    pub checking: bool,
}

impl SessionSummary {
    pub(crate) fn of(id: &str, session: &Session) -> Self {
        Self {
            id: id.to_string(),
            state: session.state,
            pairing_code: session.pairing_code.clone(),
            identity: session.identity.clone(),
            broadcasting: session.broadcasting,
            paused: session.is_paused(),
            checking: session.check_stop.is_some(),
        }
    }
}
