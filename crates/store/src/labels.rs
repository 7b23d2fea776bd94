//! Named recipient lists ("labels"), used to address broadcasts.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, load_or_default, save_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub numbers: Vec<String>,
}

/// Listing shape: name plus member count, without the numbers themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub name: String,
    pub count: usize,
}

pub struct LabelStore {
    path: PathBuf,
    inner: RwLock<Vec<Label>>,
}

impl LabelStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let labels = load_or_default(Path::new(&path));
        Self {
            path,
            inner: RwLock::new(labels),
        }
    }

    pub fn summaries(&self) -> Vec<LabelSummary> {
        self.read()
            .iter()
            .map(|l| LabelSummary {
                name: l.name.clone(),
                count: l.numbers.len(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Label> {
        self.read().iter().find(|l| l.name == name).cloned()
    }

    /// Insert or replace the label's numbers; blank entries are dropped.
    pub fn upsert(&self, name: &str, numbers: Vec<String>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidPayload("label name must be non-empty".into()));
        }
        let numbers: Vec<String> = numbers
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        let snapshot = {
            let mut labels = self.write();
            match labels.iter().position(|l| l.name == name) {
                Some(i) => labels[i].numbers = numbers,
                None => labels.push(Label {
                    name: name.to_string(),
                    numbers,
                }),
            }
            labels.clone()
        };
        save_json(&self.path, &snapshot)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let (snapshot, removed) = {
            let mut labels = self.write();
            let before = labels.len();
            labels.retain(|l| l.name != name);
            (labels.clone(), labels.len() != before)
        };
        if removed {
            save_json(&self.path, &snapshot)?;
        }
        Ok(removed)
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Label>> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Label>> {
        self.inner.write().unwrap()
    }
}
