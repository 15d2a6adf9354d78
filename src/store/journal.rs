use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;

/// One JSON document on disk.
#[derive(Debug, Clone)]
pub(super) struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub(super) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as the default value.
    pub(super) fn load<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no document yet");
            return Ok(T::default());
        }
        let json = fs::read_to_string(&self.path)?;
        if json.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&json)?)
    }

    /// Write through a sibling temp file so readers never see half a document.
    pub(super) fn save<T: Serialize>(&self, data: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "document saved");
        Ok(())
    }

    /// Apply `change` to a copy of `entries` and save it. `entries` is only
    /// replaced once the document is on disk.
    pub(super) fn commit<T, R>(
        &self,
        entries: &mut Vec<T>,
        change: impl FnOnce(&mut Vec<T>) -> R,
    ) -> Result<R, StoreError>
    where
        T: Serialize + Clone,
    {
        let mut next = entries.clone();
        let out = change(&mut next);
        self.save(&next)?;
        *entries = next;
        Ok(out)
    }
}
