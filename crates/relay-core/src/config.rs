//! Per-request execution configuration.

use std::{collections::HashMap, fmt, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How responses are returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Yield messages as they arrive.
    Stream,
    /// Return only the final text and tool summary.
    #[default]
    BufferText,
    /// Return the final response plus every raw message observed.
    BufferAll,
}

impl ResponseMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::BufferText => "buffer_text",
            Self::BufferAll => "buffer_all",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Self::Stream),
            "buffer_text" => Ok(Self::BufferText),
            "buffer_all" => Ok(Self::BufferAll),
            other => Err(ConfigError::UnknownResponseMode(other.to_string())),
        }
    }
}

/// How thinking blocks are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    /// Inline a thinking marker into the response text.
    Include,
    /// Keep thinking out of the text and out of observability logs.
    #[default]
    Exclude,
    /// Keep thinking out of the text, but let backends log it.
    LogOnly,
}

impl ThinkingMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
            Self::LogOnly => "log_only",
        }
    }

    /// Whether observability backends may record thinking content.
    #[must_use]
    pub const fn allows_logging(self) -> bool {
        !matches!(self, Self::Exclude)
    }
}

impl fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThinkingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            "log_only" => Ok(Self::LogOnly),
            other => Err(ConfigError::UnknownThinkingMode(other.to_string())),
        }
    }
}

/// Configuration error, raised while building an `ExecutorConfig`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown response mode: {0}")]
    UnknownResponseMode(String),
    #[error("Unknown thinking mode: {0}")]
    UnknownThinkingMode(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid platform tag: {0:?}")]
    InvalidPlatform(String),
    #[error("Allowed tool names must not be empty")]
    EmptyToolName,
}

/// Immutable configuration for a single execution.
///
/// Built through [`ExecutorConfig::builder`]; no accessor hands out a mutable
/// reference, so a built config cannot change while a request is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorConfig {
    user_id: String,
    platform: String,
    working_dir: Option<PathBuf>,
    session_id: Option<String>,
    system_prompt: Option<String>,
    allowed_tools: Vec<String>,
    response_mode: ResponseMode,
    thinking_mode: ThinkingMode,
    include_tool_indicators: bool,
    metadata: HashMap<String, Value>,
}

impl ExecutorConfig {
    /// Start building a config for a user on a platform.
    #[must_use]
    pub fn builder(user_id: impl Into<String>, platform: impl Into<String>) -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new(user_id, platform)
    }

    /// User identity.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Platform tag, used to partition logs and sessions.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Working directory for the agent runtime.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Prior session handle to resume.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// System prompt override.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Tool allow-list. Empty means the runtime default.
    #[must_use]
    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    #[must_use]
    pub const fn response_mode(&self) -> ResponseMode {
        self.response_mode
    }

    #[must_use]
    pub const fn thinking_mode(&self) -> ThinkingMode {
        self.thinking_mode
    }

    #[must_use]
    pub const fn include_tool_indicators(&self) -> bool {
        self.include_tool_indicators
    }

    /// Backend-specific annotations.
    #[must_use]
    pub const fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Whether a prior session is being resumed.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// JSON snapshot of the config, for observability.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Builder for [`ExecutorConfig`].
#[derive(Debug, Clone)]
pub struct ExecutorConfigBuilder {
    config: ExecutorConfig,
}

impl ExecutorConfigBuilder {
    /// Create a new builder with default modes.
    #[must_use]
    pub fn new(user_id: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            config: ExecutorConfig {
                user_id: user_id.into(),
                platform: platform.into(),
                working_dir: None,
                session_id: None,
                system_prompt: None,
                allowed_tools: Vec::new(),
                response_mode: ResponseMode::default(),
                thinking_mode: ThinkingMode::default(),
                include_tool_indicators: true,
                metadata: HashMap::new(),
            },
        }
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Resume a prior session. `None` starts a fresh conversation.
    #[must_use]
    pub fn session_id(mut self, session_id: Option<String>) -> Self {
        self.config.session_id = session_id.filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn allowed_tools<I>(mut self, tools: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.config.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.config.response_mode = mode;
        self
    }

    #[must_use]
    pub const fn thinking_mode(mut self, mode: ThinkingMode) -> Self {
        self.config.thinking_mode = mode;
        self
    }

    #[must_use]
    pub const fn include_tool_indicators(mut self, include: bool) -> Self {
        self.config.include_tool_indicators = include;
        self
    }

    /// Set a metadata value.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.metadata.insert(key.into(), value);
        self
    }

    /// Validate and freeze the config.
    ///
    /// # Errors
    /// Returns error if a required field is empty, the platform tag is not a
    /// safe path component, or a tool name is blank.
    pub fn build(self) -> Result<ExecutorConfig, ConfigError> {
        let config = self.config;
        if config.user_id.trim().is_empty() {
            return Err(ConfigError::MissingField("user_id"));
        }
        if config.platform.is_empty() {
            return Err(ConfigError::MissingField("platform"));
        }
        if !is_valid_platform(&config.platform) {
            return Err(ConfigError::InvalidPlatform(config.platform));
        }
        if config.allowed_tools.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::EmptyToolName);
        }
        Ok(config)
    }
}

/// Platform tags end up in file names, so they are restricted to `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_platform(platform: &str) -> bool {
    !platform.is_empty()
        && platform
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
