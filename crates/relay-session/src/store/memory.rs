//! In-memory session storage.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{SessionStore, StoreError};
use crate::{SessionPatch, SessionRecord};

/// In-memory storage implementation.
///
/// Useful for tests and single-process deployments.
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<(String, String), SessionRecord>>,
    default_dir: Option<PathBuf>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = Some(dir.into());
        self
    }
}

fn key(user_id: &str, platform: &str) -> (String, String) {
    (platform.to_string(), user_id.to_string())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, user_id: &str, platform: &str) -> Option<SessionRecord> {
        match self.records.read() {
            Ok(records) => records.get(&key(user_id, platform)).cloned(),
            Err(e) => {
                tracing::warn!("Session map poisoned: {e}");
                None
            }
        }
    }

    async fn save(
        &self,
        user_id: &str,
        platform: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let key = key(user_id, platform);
        let record = SessionRecord::apply(records.remove(&key), patch, Utc::now());
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn clear(&self, user_id: &str, platform: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if let Some(record) = records.get_mut(&key(user_id, platform)) {
            *record = record.clone().cleared(Utc::now());
        }
        Ok(())
    }

    fn default_dir(&self) -> Option<&Path> {
        self.default_dir.as_deref()
    }
}
