//! Reusable message templates, keyed by name.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, load_or_default, save_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub message: String,
}

pub struct TemplateStore {
    path: PathBuf,
    inner: RwLock<Vec<Template>>,
}

impl TemplateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let templates = load_or_default(Path::new(&path));
        Self {
            path,
            inner: RwLock::new(templates),
        }
    }

    pub fn list(&self) -> Vec<Template> {
        self.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        self.read().iter().find(|t| t.name == name).cloned()
    }

    /// Insert, or replace the message of an existing template with this name.
    pub fn upsert(&self, template: Template) -> Result<()> {
        if template.name.trim().is_empty() || template.message.trim().is_empty() {
            return Err(Error::InvalidPayload(
                "name and message must be non-empty".into(),
            ));
        }
        let snapshot = {
            let mut templates = self.write();
            match templates.iter().position(|t| t.name == template.name) {
                Some(i) => templates[i].message = template.message,
                None => templates.push(template),
            }
            templates.clone()
        };
        save_json(&self.path, &snapshot)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        let (snapshot, removed) = {
            let mut templates = self.write();
            let before = templates.len();
            templates.retain(|t| t.name != name);
            (templates.clone(), templates.len() != before)
        };
        if removed {
            save_json(&self.path, &snapshot)?;
        }
        Ok(removed)
    }

    #[allow(clippy::unwrap_used)]
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Template>> {
        self.inner.read().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Template>> {
        self.inner.write().unwrap()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_message_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path().join("templates.json"));
        store
            .upsert(Template {
                name: "promo".into(),
                message: "old".into(),
            })
            .unwrap();
        store
            .upsert(Template {
                name: "promo".into(),
                message: "new {name}".into(),
            })
            .unwrap();

        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("promo").unwrap().message, "new {name}");
    }

    #[test]
    fn remove_unknown_is_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = TemplateStore::open(dir.path().join("templates.json"));
        assert!(!store.remove("nope").unwrap());
    }
}
