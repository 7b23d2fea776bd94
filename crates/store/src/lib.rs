//! JSON persistence for operator-managed state.
//!
//! Each concern lives in its own file and is independently loadable: a
//! missing or unparseable file yields defaults instead of an error. Writes
//! are wholesale (single writer per file by construction).

pub mod labels;
pub mod report;
pub mod rules;
pub mod seen;
pub mod settings;
pub mod templates;

use std::path::Path;

use {
    serde::{Serialize, de::DeserializeOwned},
    thiserror::Error,
    tracing::warn,
};

pub use {
    labels::{Label, LabelStore, LabelSummary},
    rules::{AutoReplyRule, MatchMode, RuleStore},
    seen::SeenContacts,
    settings::{Settings, SettingsPatch, SettingsStore},
    templates::{Template, TemplateStore},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Load a JSON file, falling back to `T::default()` when the file is absent
/// or unreadable/corrupt (logged, never fatal).
pub(crate) fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt state file, using defaults");
                T::default()
            },
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable state file, using defaults");
            T::default()
        },
    }
}

/// Write a value as pretty JSON, creating parent directories as needed.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}
