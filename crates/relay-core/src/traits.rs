//! Agent runtime capability consumed by the executor.

use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{ExecutorConfig, Message};

/// Where the runtime loads its own settings from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    Project,
    User,
    Local,
}

impl SettingSource {
    /// Every source, in the order the runtime applies them.
    pub const ALL: [Self; 3] = [Self::Project, Self::User, Self::Local];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SettingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a connection is constructed from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub working_dir: Option<PathBuf>,
    pub resume_session_id: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub setting_sources: Vec<SettingSource>,
}

impl RuntimeOptions {
    /// Derive runtime options from an execution config.
    #[must_use]
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            working_dir: config.working_dir().map(PathBuf::from),
            resume_session_id: config.session_id().map(str::to_string),
            system_prompt: config.system_prompt().map(str::to_string),
            allowed_tools: config.allowed_tools().to_vec(),
            setting_sources: SettingSource::ALL.to_vec(),
        }
    }
}

/// Runtime error.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Connection is not open")]
    NotConnected,
    #[error("Message stream already taken")]
    StreamTaken,
    #[error("Connection closed: {0}")]
    Closed(String),
}

impl RuntimeError {
    /// Stable short name of the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SpawnFailed(_) => "spawn",
            Self::ExecutableNotFound(_) => "executable_not_found",
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::NotConnected => "not_connected",
            Self::StreamTaken => "stream_taken",
            Self::Closed(_) => "closed",
        }
    }
}

/// Owned stream of runtime messages.
pub type MessageStream = BoxStream<'static, Result<Message, RuntimeError>>;

/// A single live connection to the agent runtime.
///
/// Lifecycle: `connect` -> `submit` -> `receive_messages` -> `disconnect`.
/// `interrupt` may be called at any point while the stream is being consumed.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Open the connection.
    async fn connect(&mut self) -> Result<(), RuntimeError>;

    /// Submit a prompt.
    async fn submit(&self, prompt: &str) -> Result<(), RuntimeError>;

    /// Take the stream of messages for the submitted prompt. Can be taken once.
    fn receive_messages(&mut self) -> Result<MessageStream, RuntimeError>;

    /// Ask the runtime to stop the in-flight request.
    async fn interrupt(&self) -> Result<(), RuntimeError>;

    /// Close the connection and release its resources.
    async fn disconnect(&mut self) -> Result<(), RuntimeError>;
}

/// Factory for agent runtime connections.
pub trait AgentRuntime: Send + Sync {
    /// Create an unopened connection for the given options.
    fn connection(&self, options: RuntimeOptions) -> Box<dyn AgentConnection>;
}

/// Caller-side handle for interrupting an in-flight execution.
///
/// Cloning shares the same signal. Interrupting twice, or after the
/// execution finished, is a no-op.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: CancellationToken,
    signalled: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Create a new, unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal an interrupt. Returns `false` if it was already signalled.
    pub fn interrupt(&self) -> bool {
        if self.signalled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Whether an interrupt has been signalled.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once an interrupt is signalled.
    pub async fn interrupted(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutorConfig;

    #[test]
    fn test_options_from_config() {
        let config = ExecutorConfig::builder("u", "api")
            .working_dir("/srv/project")
            .session_id(Some("s1".to_string()))
            .system_prompt("be brief")
            .allowed_tools(["Read", "Bash"])
            .build()
            .unwrap();
        let options = RuntimeOptions::from_config(&config);
        assert_eq!(options.working_dir, Some(PathBuf::from("/srv/project")));
        assert_eq!(options.resume_session_id.as_deref(), Some("s1"));
        assert_eq!(options.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(options.allowed_tools, vec!["Read", "Bash"]);
        assert_eq!(options.setting_sources, SettingSource::ALL.to_vec());
    }

    #[test]
    fn test_interrupt_is_idempotent() {
        let handle = InterruptHandle::new();
        let observer = handle.clone();
        assert!(!observer.is_interrupted());
        assert!(handle.interrupt());
        assert!(!handle.interrupt());
        tokio_test::assert_ready!(tokio_test::task::spawn(observer.interrupted()).poll());
    }
}
