//! Conversation manager for chat front-ends.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use relay_core::{
    ConfigError, ExecutorConfig, InterruptHandle, Metrics, ProcessedResponse, ResponseMode,
    ThinkingMode,
};
use relay_executor::{ExecuteError, Executor};
use crate::{SessionPatch, SessionStore, StoreError};

/// Tools granted to conversations unless configured otherwise.
pub const DEFAULT_ALLOWED_TOOLS: [&str; 4] = ["Read", "Write", "Bash", "Edit"];

/// Default system prompt for conversations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. You help users with code, \
     file operations, and technical tasks.";

/// Reply text used when the runtime produced no text.
pub const EMPTY_REPLY: &str = "I processed your request, but I don't have a text response to show.";

/// Conversation manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Execution failed: {0}")]
    Execute(#[from] ExecuteError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Settings shared by every conversation.
#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub include_tool_indicators: bool,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            allowed_tools: DEFAULT_ALLOWED_TOOLS.map(String::from).to_vec(),
            include_tool_indicators: true,
        }
    }
}

/// What a front-end shows the user after one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// Tools used, repeats removed.
    pub tools: Vec<String>,
    pub session_id: Option<String>,
    pub cwd: PathBuf,
    pub metrics: Metrics,
}

/// Snapshot of a user's conversation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStatus {
    pub session_id: Option<String>,
    pub cwd: PathBuf,
    pub show_thinking: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Whether a request is in flight.
    pub busy: bool,
}

struct ActiveRequest {
    id: u64,
    interrupt: InterruptHandle,
}

type UserKey = (String, String);
type ActiveMap = HashMap<UserKey, ActiveRequest>;

fn lock(active: &Mutex<ActiveMap>) -> MutexGuard<'_, ActiveMap> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unregisters an in-flight request when dropped, including when the
/// caller abandons the `send` future.
struct ActiveGuard<'a> {
    active: &'a Mutex<ActiveMap>,
    key: UserKey,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = lock(self.active);
        if active.get(&self.key).is_some_and(|a| a.id == self.id) {
            active.remove(&self.key);
        }
    }
}

fn key(user_id: &str, platform: &str) -> UserKey {
    (platform.to_string(), user_id.to_string())
}

/// Runs user messages through the executor with per-user session state.
pub struct ConversationManager<S>
where
    S: SessionStore,
{
    store: S,
    executor: Executor,
    settings: ConversationSettings,
    active: Mutex<ActiveMap>,
    next_request: AtomicU64,
}

impl<S> ConversationManager<S>
where
    S: SessionStore,
{
    #[must_use]
    pub fn new(store: S, executor: Executor) -> Self {
        Self::with_settings(store, executor, ConversationSettings::default())
    }

    #[must_use]
    pub fn with_settings(store: S, executor: Executor, settings: ConversationSettings) -> Self {
        Self {
            store,
            executor,
            settings,
            active: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Process one user message.
    ///
    /// Resumes the stored session, runs in the user's working directory and
    /// stores the returned session handle. A failed store write is logged and
    /// does not fail the reply.
    ///
    /// # Errors
    /// Returns error if the config cannot be built or execution fails.
    pub async fn send(&self, user_id: &str, platform: &str, prompt: &str) -> Result<Reply, ManagerError> {
        self.send_with_thinking(user_id, platform, prompt, None).await
    }

    /// Like [`Self::send`], with `show_thinking` overriding the stored preference.
    ///
    /// # Errors
    /// Returns error if the config cannot be built or execution fails.
    pub async fn send_with_thinking(
        &self,
        user_id: &str,
        platform: &str,
        prompt: &str,
        show_thinking: Option<bool>,
    ) -> Result<Reply, ManagerError> {
        let config = self
            .request_config(user_id, platform, ResponseMode::BufferText, show_thinking)
            .await?;

        let interrupt = InterruptHandle::new();
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        lock(&self.active).insert(
            key(user_id, platform),
            ActiveRequest {
                id: request_id,
                interrupt: interrupt.clone(),
            },
        );
        let guard = ActiveGuard {
            active: &self.active,
            key: key(user_id, platform),
            id: request_id,
        };

        let result = self
            .executor
            .execute_with_interrupt(prompt, &config, interrupt)
            .await;
        drop(guard);

        let response = result?;
        self.remember(&config, &response).await;

        let tools = response.unique_tools().into_iter().map(String::from).collect();
        let text = if response.text.is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            response.text
        };

        Ok(Reply {
            text,
            tools,
            session_id: response.session_id,
            cwd: config.working_dir().map(Path::to_path_buf).unwrap_or_default(),
            metrics: response.metrics,
        })
    }

    /// Build the config for the user's next request from their stored state.
    ///
    /// # Errors
    /// Returns error if the user or platform is invalid.
    pub async fn request_config(
        &self,
        user_id: &str,
        platform: &str,
        response_mode: ResponseMode,
        show_thinking: Option<bool>,
    ) -> Result<ExecutorConfig, ManagerError> {
        let record = self.store.load(user_id, platform).await;
        let cwd = self.store.working_directory(user_id, platform).await;
        let show_thinking =
            show_thinking.unwrap_or_else(|| record.as_ref().is_some_and(|r| r.show_thinking));
        let session_id = record.and_then(|r| r.session_id);

        if let Some(session_id) = &session_id {
            tracing::info!(user_id, platform, session_id, "Resuming session");
        }
        tracing::info!(user_id, platform, cwd = %cwd.display(), "Using working directory");

        let mut builder = ExecutorConfig::builder(user_id, platform)
            .working_dir(cwd)
            .session_id(session_id)
            .allowed_tools(self.settings.allowed_tools.iter().cloned())
            .response_mode(response_mode)
            .thinking_mode(if show_thinking {
                ThinkingMode::Include
            } else {
                ThinkingMode::Exclude
            })
            .include_tool_indicators(self.settings.include_tool_indicators);
        if let Some(prompt) = &self.settings.system_prompt {
            builder = builder.system_prompt(prompt.clone());
        }
        Ok(builder.build()?)
    }

    /// Store the session handle returned for a request built by
    /// [`Self::request_config`], together with the directory it ran in.
    pub async fn remember(&self, config: &ExecutorConfig, response: &ProcessedResponse) {
        let Some(session_id) = &response.session_id else {
            return;
        };
        let mut patch = SessionPatch::session(session_id.clone());
        if let Some(cwd) = config.working_dir() {
            patch = patch.with_cwd(cwd);
        }
        if let Err(e) = self
            .store
            .save(config.user_id(), config.platform(), patch)
            .await
        {
            tracing::warn!(
                user_id = config.user_id(),
                platform = config.platform(),
                "Failed to persist session: {e}"
            );
        }
    }

    /// Start a fresh conversation. Working directory and preferences are kept.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub async fn reset(&self, user_id: &str, platform: &str) -> Result<(), ManagerError> {
        self.store.clear(user_id, platform).await?;
        Ok(())
    }

    /// Set the working directory after checking it exists.
    ///
    /// A leading `~` is expanded to the home directory. Returns the stored path.
    ///
    /// # Errors
    /// Returns error if the path is missing, not a directory, or cannot be stored.
    pub async fn set_working_directory(
        &self,
        user_id: &str,
        platform: &str,
        dir: impl AsRef<Path>,
    ) -> Result<PathBuf, ManagerError> {
        let dir = expand_home(dir.as_ref());
        let metadata = match tokio::fs::metadata(&dir).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManagerError::PathNotFound(dir));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_dir() {
            return Err(ManagerError::NotADirectory(dir));
        }

        self.store
            .save(user_id, platform, SessionPatch::cwd(dir.clone()))
            .await?;
        tracing::info!(user_id, platform, cwd = %dir.display(), "Set working directory");
        Ok(dir)
    }

    /// # Errors
    /// Returns error if the store cannot be written.
    pub async fn set_show_thinking(&self, user_id: &str, platform: &str, show: bool) -> Result<(), ManagerError> {
        self.store
            .save(user_id, platform, SessionPatch::show_thinking(show))
            .await?;
        Ok(())
    }

    pub async fn status(&self, user_id: &str, platform: &str) -> ConversationStatus {
        let record = self.store.load(user_id, platform).await;
        let cwd = self.store.working_directory(user_id, platform).await;
        let busy = lock(&self.active).contains_key(&key(user_id, platform));
        ConversationStatus {
            session_id: record.as_ref().and_then(|r| r.session_id.clone()),
            cwd,
            show_thinking: record.as_ref().is_some_and(|r| r.show_thinking),
            created_at: record.as_ref().map(|r| r.created_at),
            last_updated: record.as_ref().map(|r| r.last_updated),
            busy,
        }
    }

    /// Interrupt the user's in-flight request.
    ///
    /// Returns `false` if nothing was running or it was already interrupted.
    pub async fn interrupt(&self, user_id: &str, platform: &str) -> bool {
        let signalled = lock(&self.active)
            .get(&key(user_id, platform))
            .is_some_and(|a| a.interrupt.interrupt());
        if signalled {
            tracing::info!(user_id, platform, "Interrupt requested");
        }
        signalled
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}
