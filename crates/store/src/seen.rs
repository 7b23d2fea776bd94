//! Addresses that have already received the welcome message.
//!
//! Append-only; persisted after every addition so a restart never re-welcomes
//! a known contact.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::{Result, load_or_default, save_json};

pub struct SeenContacts {
    path: PathBuf,
    inner: RwLock<BTreeSet<String>>,
}

impl SeenContacts {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen: Vec<String> = load_or_default(Path::new(&path));
        Self {
            path,
            inner: RwLock::new(seen.into_iter().collect()),
        }
    }

    pub fn contains(&self, address: &str) -> bool {
        self.read().contains(address)
    }

    /// Record an address; persists and returns `true` if it was new.
    pub fn insert(&self, address: &str) -> Result<bool> {
        let snapshot = {
            let mut seen = self.write();
            if !seen.insert(address.to_string()) {
                return Ok(false);
            }
            seen.iter().cloned().collect::<Vec<_>>()
        };
        save_json(&self.path, &snapshot)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeSet<String>> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeSet<String>> {
        self.inner.write().unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let seen = SeenContacts::open(&path);
        assert!(seen.insert("62811@c.us").unwrap());
        assert!(!seen.insert("62811@c.us").unwrap());
        assert!(seen.contains("62811@c.us"));

        let reloaded = SeenContacts::open(&path);
        assert!(reloaded.contains("62811@c.us"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SeenContacts::open(&path).is_empty());
    }
}
