//! Keyword auto-reply rules, persisted in stored order.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, load_or_default, save_json};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Keyword must equal the whole message (case-insensitive).
    Exact,
    /// Keyword may appear anywhere in the message (case-insensitive).
    #[default]
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReplyRule {
    pub keyword: String,
    pub response: String,
    #[serde(default, rename = "type")]
    pub match_mode: MatchMode,
}

impl AutoReplyRule {
    pub fn matches(&self, body: &str) -> bool {
        let body = body.to_lowercase();
        let keyword = self.keyword.to_lowercase();
        match self.match_mode {
            MatchMode::Exact => body == keyword,
            MatchMode::Contains => body.contains(&keyword),
        }
    }
}

/// First rule in stored order whose keyword matches `body`.
pub fn find_match<'a>(rules: &'a [AutoReplyRule], body: &str) -> Option<&'a AutoReplyRule> {
    rules.iter().find(|rule| rule.matches(body))
}

pub struct RuleStore {
    path: PathBuf,
    inner: RwLock<Vec<AutoReplyRule>>,
}

impl RuleStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rules = load_or_default(Path::new(&path));
        Self {
            path,
            inner: RwLock::new(rules),
        }
    }

    pub fn list(&self) -> Vec<AutoReplyRule> {
        self.read().clone()
    }

    /// Insert or replace the rule with the same keyword (case-insensitive).
    pub fn upsert(&self, rule: AutoReplyRule) -> Result<()> {
        if rule.keyword.trim().is_empty() || rule.response.trim().is_empty() {
            return Err(Error::InvalidPayload(
                "keyword and response must be non-empty".into(),
            ));
        }
        let snapshot = {
            let mut rules = self.write();
            let keyword = rule.keyword.to_lowercase();
            match rules.iter().position(|r| r.keyword.to_lowercase() == keyword) {
                Some(i) => rules[i] = rule,
                None => rules.push(rule),
            }
            rules.clone()
        };
        save_json(&self.path, &snapshot)
    }

    /// Remove the rule with exactly this keyword; returns whether one existed.
    pub fn remove(&self, keyword: &str) -> Result<bool> {
        let (snapshot, removed) = {
            let mut rules = self.write();
            let before = rules.len();
            rules.retain(|r| r.keyword != keyword);
            (rules.clone(), rules.len() != before)
        };
        if removed {
            save_json(&self.path, &snapshot)?;
        }
        Ok(removed)
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<AutoReplyRule>> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<AutoReplyRule>> {
        self.inner.write().unwrap()
    }
}
