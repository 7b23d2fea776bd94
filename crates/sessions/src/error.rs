use thiserror::Error;

/// Operator-input and state errors, reported synchronously with no state
/// mutated. Transport failures surface through the `Transport` variant only
/// on direct operations; job-loop failures become delivery records instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("session already exists: {0}")]
    DuplicateSession(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("session is not ready: {0}")]
    NotReady(String),

    #[error("a broadcast is already active for session {0}")]
    AlreadyRunning(String),

    #[error("a number check is already active for session {0}")]
    AlreadyChecking(String),

    #[error("target list is empty")]
    EmptyTargets,

    #[error("broadcast content has no text, attachment or location")]
    MissingContent,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("report export failed: {0}")]
    Report(#[from] wablast_store::Error),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
