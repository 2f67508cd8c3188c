//! Persisted per-user session state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's state on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Handle for resuming the conversation. Absent until the first completed exchange.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub show_thinking: bool,
    /// Set once, on the first write.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Rewritten on every mutation; never moves backwards.
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl SessionRecord {
    /// Overlay `patch` onto `existing`, or create a record from it.
    #[must_use]
    pub fn apply(existing: Option<Self>, patch: SessionPatch, now: DateTime<Utc>) -> Self {
        let mut record = existing.unwrap_or_else(|| Self {
            session_id: None,
            cwd: None,
            show_thinking: false,
            created_at: now,
            last_updated: now,
        });
        if let Some(session_id) = patch.session_id {
            record.session_id = Some(session_id);
        }
        if let Some(cwd) = patch.cwd {
            record.cwd = Some(cwd);
        }
        if let Some(show_thinking) = patch.show_thinking {
            record.show_thinking = show_thinking;
        }
        record.touch(now);
        record
    }

    /// Drop the session handle, keeping everything else.
    #[must_use]
    pub fn cleared(mut self, now: DateTime<Utc>) -> Self {
        self.session_id = None;
        self.touch(now);
        self
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = self.last_updated.max(now);
    }
}

/// A partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub show_thinking: Option<bool>,
}

impl SessionPatch {
    #[must_use]
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn show_thinking(show: bool) -> Self {
        Self {
            show_thinking: Some(show),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_created_at_set_once() {
        let t0 = Utc::now();
        let t1 = t0 + TimeDelta::seconds(5);

        let first = SessionRecord::apply(None, SessionPatch::session("s1"), t0);
        assert_eq!(first.created_at, t0);
        assert_eq!(first.last_updated, t0);

        let second = SessionRecord::apply(Some(first), SessionPatch::cwd("/tmp"), t1);
        assert_eq!(second.created_at, t0);
        assert_eq!(second.last_updated, t1);
        assert_eq!(second.session_id.as_deref(), Some("s1"));
        assert_eq!(second.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_last_updated_never_moves_backwards() {
        let t0 = Utc::now();
        let earlier = t0 - TimeDelta::seconds(30);
        let record = SessionRecord::apply(None, SessionPatch::show_thinking(true), t0);
        let record = record.cleared(earlier);
        assert_eq!(record.last_updated, t0);
        assert!(record.show_thinking);
    }

    #[test]
    fn test_reads_legacy_file_without_preferences() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"session_id":"abc","cwd":"/home/u","last_updated":"2025-01-02T03:04:05.678901Z","created_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.session_id.as_deref(), Some("abc"));
        assert!(!record.show_thinking);
        assert!(record.created_at < record.last_updated);
    }
}
