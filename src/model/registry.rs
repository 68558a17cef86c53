//! In-memory model registry with the lock/update/unlock protocol.
//!
//! The driver write-locks its model for the duration of a build and
//! pushes snapshots at every scoring pass, so readers always see the
//! last consistent persisted state no matter how the build ends.

use crate::core::error::{ChunktreeError, Result};
use crate::core::types::ModelId;
use crate::model::EnsembleModel;
use std::collections::HashMap;
use std::sync::Mutex;

struct Entry {
    snapshot: Vec<u8>,
    locked: bool,
}

/// Registry of persisted models.
#[derive(Default)]
pub struct ModelRegistry {
    inner: Mutex<HashMap<ModelId, Entry>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Registers `model` under its id and write-locks it, smashing any
    /// prior unlocked model with the same id.
    pub fn create_locked(&self, model: &EnsembleModel) -> Result<()> {
        let snapshot = model.to_snapshot()?;
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(&model.id) {
            if existing.locked {
                return Err(ChunktreeError::registry(format!(
                    "model '{}' is locked by another build",
                    model.id
                )));
            }
        }
        map.insert(
            model.id.clone(),
            Entry {
                snapshot,
                locked: true,
            },
        );
        Ok(())
    }

    /// Write-locks an existing model.
    pub fn lock(&self, id: &str) -> Result<()> {
        let mut map = self.inner.lock().unwrap();
        let entry = map
            .get_mut(id)
            .ok_or_else(|| ChunktreeError::registry(format!("unknown model '{}'", id)))?;
        if entry.locked {
            return Err(ChunktreeError::registry(format!(
                "model '{}' is locked by another build",
                id
            )));
        }
        entry.locked = true;
        Ok(())
    }

    /// Replaces the snapshot of a locked model.
    pub fn update(&self, model: &EnsembleModel) -> Result<()> {
        let snapshot = model.to_snapshot()?;
        let mut map = self.inner.lock().unwrap();
        let entry = map
            .get_mut(&model.id)
            .ok_or_else(|| ChunktreeError::registry(format!("unknown model '{}'", model.id)))?;
        if !entry.locked {
            return Err(ChunktreeError::registry(format!(
                "model '{}' is not locked for writing",
                model.id
            )));
        }
        entry.snapshot = snapshot;
        Ok(())
    }

    /// Releases the write lock.
    pub fn unlock(&self, id: &str) -> Result<()> {
        let mut map = self.inner.lock().unwrap();
        let entry = map
            .get_mut(id)
            .ok_or_else(|| ChunktreeError::registry(format!("unknown model '{}'", id)))?;
        entry.locked = false;
        Ok(())
    }

    /// Removes an unlocked model.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut map = self.inner.lock().unwrap();
        let locked = match map.get(id) {
            None => return Err(ChunktreeError::registry(format!("unknown model '{}'", id))),
            Some(entry) => entry.locked,
        };
        if locked {
            return Err(ChunktreeError::registry(format!(
                "model '{}' is locked and cannot be deleted",
                id
            )));
        }
        map.remove(id);
        Ok(())
    }

    /// Reads the last persisted snapshot of a model, if any.
    pub fn get(&self, id: &str) -> Result<Option<EnsembleModel>> {
        let map = self.inner.lock().unwrap();
        match map.get(id) {
            None => Ok(None),
            Some(entry) => Ok(Some(EnsembleModel::from_snapshot(&entry.snapshot)?)),
        }
    }

    /// True when a model with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(id)
    }
}
