//! JSON file per user per platform.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::Utc;
use relay_core::config::is_valid_platform;
use tokio::fs;

use super::{SessionStore, StoreError};
use crate::{SessionPatch, SessionRecord};

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Stores each record at `{root}/{platform}_sessions/{user_id}.json`.
///
/// Writes for one `(platform, user_id)` are serialized within this process
/// and land through a temp file plus rename. Separate processes sharing the
/// directory are not coordinated: the last writer wins.
#[derive(Debug)]
pub struct FileSessionStore {
    root: PathBuf,
    default_dir: Option<PathBuf>,
    locks: Mutex<HashMap<(String, String), KeyLock>>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_dir: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Working directory for users without one.
    #[must_use]
    pub fn with_default_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding a user's record.
    ///
    /// # Errors
    /// Returns error if `platform` is not a safe path component.
    pub fn record_path(&self, user_id: &str, platform: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_platform(platform) {
            return Err(StoreError::InvalidPlatform(platform.to_string()));
        }
        Ok(self
            .root
            .join(format!("{platform}_sessions"))
            .join(format!("{}.json", file_stem(user_id))))
    }

    fn key_lock(&self, user_id: &str, platform: &str) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry((platform.to_string(), user_id.to_string()))
                .or_default(),
        )
    }

    /// Drop the map entry once no other writer holds or waits on it.
    fn release_lock(&self, user_id: &str, platform: &str, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One count for the map, one for `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&(platform.to_string(), user_id.to_string()));
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn read(path: &Path) -> Option<SessionRecord> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read session record: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring corrupt session record: {e}");
                None
            }
        }
    }

    async fn write(path: &Path, record: &SessionRecord) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Map a user id onto a file name, one-to-one.
///
/// `[A-Za-z0-9-]` is kept as is. Every other byte, `_` included, becomes
/// `_XX` (uppercase hex), so distinct ids never share a file. The empty id
/// maps to a lone `_`, which no other id produces.
fn file_stem(user_id: &str) -> String {
    if user_id.is_empty() {
        return "_".to_string();
    }
    let mut stem = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push('_');
            stem.push(char::from(HEX[usize::from(byte >> 4)]));
            stem.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
    }
    stem
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, user_id: &str, platform: &str) -> Option<SessionRecord> {
        match self.record_path(user_id, platform) {
            Ok(path) => Self::read(&path).await,
            Err(e) => {
                tracing::warn!(user_id, "Cannot load session: {e}");
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
        let path = self.record_path(user_id, platform)?;
        let lock = self.key_lock(user_id, platform);
        let result = {
            let _guard = lock.lock().await;
            let record = SessionRecord::apply(Self::read(&path).await, patch, Utc::now());
            Self::write(&path, &record).await.map(|()| record)
        };
        self.release_lock(user_id, platform, lock);

        let record = result?;
        tracing::debug!(user_id, platform, "Saved session record");
        Ok(record)
    }

    async fn clear(&self, user_id: &str, platform: &str) -> Result<(), StoreError> {
        let path = self.record_path(user_id, platform)?;
        let lock = self.key_lock(user_id, platform);
        let result = {
            let _guard = lock.lock().await;
            match Self::read(&path).await {
                Some(record) => Self::write(&path, &record.cleared(Utc::now()))
                    .await
                    .map(|()| true),
                None => Ok(false),
            }
        };
        self.release_lock(user_id, platform, lock);

        if result? {
            tracing::info!(user_id, platform, "Cleared session");
        }
        Ok(())
    }

    fn default_dir(&self) -> Option<&Path> {
        self.default_dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());

        let first = store
            .save("42", "telegram", SessionPatch::session("s1").with_cwd("/work"))
            .await
            .unwrap();
        let second = store.save("42", "telegram", SessionPatch::session("s2")).await.unwrap();

        let loaded = store.load("42", "telegram").await.unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.session_id.as_deref(), Some("s2"));
        assert_eq!(loaded.cwd, Some(PathBuf::from("/work")));
        assert_eq!(loaded.created_at, first.created_at);
        assert!(loaded.last_updated >= first.last_updated);

        assert!(dir.path().join("telegram_sessions/42.json").is_file());
        assert!(store.load("42", "slack").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_keeps_everything_but_session() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        store
            .save("u", "slack", SessionPatch::session("s1").with_cwd("/work"))
            .await
            .unwrap();
        let before = store.save("u", "slack", SessionPatch::show_thinking(true)).await.unwrap();

        store.clear("u", "slack").await.unwrap();

        let after = store.load("u", "slack").await.unwrap();
        assert_eq!(after.session_id, None);
        assert_eq!(after.cwd, Some(PathBuf::from("/work")));
        assert!(after.show_thinking);
        assert_eq!(after.created_at, before.created_at);

        store.clear("nobody", "slack").await.unwrap();
        assert!(store.load("nobody", "slack").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path()).with_default_dir("/fallback");
        let path = store.record_path("u", "api").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(store.load("u", "api").await.is_none());
        assert!(!store.show_thinking("u", "api").await);
        assert_eq!(store.working_directory("u", "api").await, PathBuf::from("/fallback"));

        let record = store.save("u", "api", SessionPatch::session("fresh")).await.unwrap();
        assert_eq!(record.session_id.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_working_directory_fallbacks() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert_eq!(
            store.working_directory("u", "api").await,
            std::env::current_dir().unwrap()
        );

        store.save("u", "api", SessionPatch::cwd("/projects/x")).await.unwrap();
        assert_eq!(store.working_directory("u", "api").await, PathBuf::from("/projects/x"));
    }

    #[tokio::test]
    async fn test_user_ids_cannot_escape_root() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let path = store.record_path("../../etc/passwd", "api").unwrap();
        assert!(path.starts_with(dir.path().join("api_sessions")));
        assert_eq!(
            path.file_name().unwrap(),
            "_2E_2E_2F_2E_2E_2Fetc_2Fpasswd.json"
        );

        assert!(matches!(
            store.save("u", "../x", SessionPatch::default()).await,
            Err(StoreError::InvalidPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writes_for_one_user_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileSessionStore::new(dir.path()));

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save("u", "api", SessionPatch::session("s1")).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save("u", "api", SessionPatch::cwd("/work")).await })
        };
        let c = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.save("u", "api", SessionPatch::show_thinking(true)).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        c.await.unwrap().unwrap();

        let record = store.load("u", "api").await.unwrap();
        assert_eq!(record.session_id.as_deref(), Some("s1"));
        assert_eq!(record.cwd, Some(PathBuf::from("/work")));
        assert!(record.show_thinking);
    }

    #[tokio::test]
    async fn test_similar_user_ids_keep_separate_records() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        store
            .save("alice@x.com", "api", SessionPatch::session("alice-secret"))
            .await
            .unwrap();

        assert!(store.load("alice_x_com", "api").await.is_none());
        assert!(store.load("alice.x.com", "api").await.is_none());
        store.save("alice_x_com", "api", SessionPatch::session("other")).await.unwrap();

        assert_eq!(
            store.load("alice@x.com", "api").await.unwrap().session_id.as_deref(),
            Some("alice-secret")
        );
        assert_ne!(
            store.record_path("alice@x.com", "api").unwrap(),
            store.record_path("alice_x_com", "api").unwrap()
        );
        assert_eq!(file_stem("12345"), "12345");
        assert_ne!(file_stem(""), file_stem("_"));
    }

    #[tokio::test]
    async fn test_key_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        for user in ["a", "b", "c"] {
            store.save(user, "api", SessionPatch::session("s")).await.unwrap();
            store.clear(user, "api").await.unwrap();
        }
        assert_eq!(store.lock_count(), 0);
    }
}
