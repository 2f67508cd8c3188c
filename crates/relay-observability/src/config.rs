//! Backend configuration.
//!
//! Backends never read the environment themselves. The application reads it
//! once, through [`ObservabilityConfig::from_env`], and hands the result to
//! [`crate::ObservabilityHub::from_config`].

use std::{path::PathBuf, time::Duration};

const DEFAULT_POSTHOG_HOST: &str = "https://app.posthog.com";

/// Console backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub enabled: bool,
}

/// JSONL file backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogConfig {
    pub enabled: bool,
    /// Directory holding one `{platform}_requests.jsonl` per platform.
    pub dir: PathBuf,
    /// Write truncated payload previews (prompt, text, tool input/output).
    /// Off by default: only lengths and names are recorded.
    pub include_previews: bool,
    pub prompt_preview_chars: usize,
    pub content_preview_chars: usize,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            include_previews: false,
            prompt_preview_chars: 200,
            content_preview_chars: 1000,
        }
    }
}

/// PostHog analytics settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostHogConfig {
    pub api_key: String,
    pub host: String,
    /// Events buffered before a flush is forced.
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl PostHogConfig {
    /// Create a config with the default host and batching.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_POSTHOG_HOST.to_string(),
            batch_size: 20,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Configuration for every built-in backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub console: ConsoleConfig,
    pub file: FileLogConfig,
    /// `None` disables PostHog.
    pub posthog: Option<PostHogConfig>,
}

impl ObservabilityConfig {
    /// Read configuration from the process environment.
    ///
    /// Recognized keys: `DEBUG`, `FILE_LOGGING`, `FILE_LOG_DIR`,
    /// `FILE_LOG_PREVIEWS`, `POSTHOG_API_KEY`, `POSTHOG_HOST`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|v| is_truthy(&v));

        let mut file = FileLogConfig {
            enabled: flag("FILE_LOGGING"),
            include_previews: flag("FILE_LOG_PREVIEWS"),
            ..FileLogConfig::default()
        };
        if let Some(dir) = lookup("FILE_LOG_DIR").filter(|d| !d.trim().is_empty()) {
            file.dir = PathBuf::from(dir);
        }

        let posthog = lookup("POSTHOG_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|key| {
                let mut config = PostHogConfig::new(key);
                if let Some(host) = lookup("POSTHOG_HOST").filter(|h| !h.trim().is_empty()) {
                    config.host = host;
                }
                config
            });

        Self {
            console: ConsoleConfig {
                enabled: flag("DEBUG"),
            },
            file,
            posthog,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
