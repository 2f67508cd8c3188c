//! Session storage.

pub mod file;
pub mod memory;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use crate::{SessionPatch, SessionRecord};

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Durable per-user records, keyed by `(platform, user_id)`.
///
/// Reads never fail: a missing, unreadable or corrupt record is reported as
/// absent. Writes are read-modify-write and return the stored record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the record, if any.
    async fn load(&self, user_id: &str, platform: &str) -> Option<SessionRecord>;

    /// Merge `patch` onto the existing record, creating it if needed.
    async fn save(
        &self,
        user_id: &str,
        platform: &str,
        patch: SessionPatch,
    ) -> Result<SessionRecord, StoreError>;

    /// Remove the session handle only. A missing record is left missing.
    async fn clear(&self, user_id: &str, platform: &str) -> Result<(), StoreError>;

    /// Directory used when a record has no `cwd`.
    fn default_dir(&self) -> Option<&Path> {
        None
    }

    /// The user's working directory: record, then default, then the process directory.
    async fn working_directory(&self, user_id: &str, platform: &str) -> PathBuf {
        if let Some(cwd) = self.load(user_id, platform).await.and_then(|r| r.cwd) {
            return cwd;
        }
        self.default_dir()
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Whether thinking is shown to the user. Defaults to `false`.
    async fn show_thinking(&self, user_id: &str, platform: &str) -> bool {
        self.load(user_id, platform)
            .await
            .is_some_and(|r| r.show_thinking)
    }
}
