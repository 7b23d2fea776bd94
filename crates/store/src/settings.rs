//! Process-wide settings, persisted to `settings.json`.
//!
//! Absent keys keep their defaults on load, so files written by older
//! versions merge cleanly.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{Result, load_or_default, save_json};

fn default_ai_system_prompt() -> String {
    "You are a friendly virtual assistant that answers customer questions briefly.".into()
}

fn default_country_code() -> String {
    wablast_common::DEFAULT_COUNTRY_CODE.into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Inbound messages are forwarded here when non-empty.
    pub webhook_url: String,
    pub ai_enabled: bool,
    pub ai_system_prompt: String,
    /// Comma-separated topics the AI may answer about; empty = unrestricted.
    pub ai_allowed_topics: String,
    /// Sent once to every never-seen sender when non-empty.
    pub welcome_message: String,
    /// Chat/sender addresses the AI must never reply to.
    pub ai_blacklist: Vec<String>,
    pub ai_ignore_groups: bool,
    pub auto_reject_call: bool,
    /// Skip keyword auto-replies in group chats.
    pub ar_ignore_groups: bool,
    /// Max AI replies per sender per calendar day; 0 = unlimited.
    pub ai_daily_limit: u32,
    /// Country code substituted for the local trunk prefix.
    pub default_country_code: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            ai_enabled: false,
            ai_system_prompt: default_ai_system_prompt(),
            ai_allowed_topics: String::new(),
            welcome_message: String::new(),
            ai_blacklist: Vec::new(),
            ai_ignore_groups: false,
            auto_reject_call: false,
            ar_ignore_groups: false,
            ai_daily_limit: 0,
            default_country_code: default_country_code(),
        }
    }
}

/// Partial settings update; only present fields are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub webhook_url: Option<String>,
    pub ai_enabled: Option<bool>,
    pub ai_system_prompt: Option<String>,
    pub ai_allowed_topics: Option<String>,
    pub welcome_message: Option<String>,
    pub ai_blacklist: Option<Vec<String>>,
    pub ai_ignore_groups: Option<bool>,
    pub auto_reject_call: Option<bool>,
    pub ar_ignore_groups: Option<bool>,
    pub ai_daily_limit: Option<u32>,
    pub default_country_code: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = load_or_default(Path::new(&path));
        Self {
            path,
            inner: RwLock::new(settings),
        }
    }

    /// Current settings; always re-read by callers per operation, never cached.
    pub fn get(&self) -> Settings {
        self.read().clone()
    }

    /// Apply a partial update and persist.
    pub fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        let updated = {
            let mut settings = self.write();
            macro_rules! apply {
                ($($field:ident),* $(,)?) => {
                    $(if let Some(value) = patch.$field {
                        settings.$field = value;
                    })*
                };
            }
            apply!(
                webhook_url,
                ai_enabled,
                ai_system_prompt,
                ai_allowed_topics,
                welcome_message,
                ai_blacklist,
                ai_ignore_groups,
                auto_reject_call,
                ar_ignore_groups,
                ai_daily_limit,
                default_country_code,
            );
            settings.clone()
        };
        save_json(&self.path, &updated)?;
        Ok(updated)
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Settings> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.inner.write().unwrap()
    }
}
