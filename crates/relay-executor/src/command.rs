//! Command line assembly for the agent CLI.

use std::path::{Path, PathBuf};

use relay_core::RuntimeError;
use thiserror::Error;

/// Command build error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    NotFound(String),
}

impl From<CommandBuildError> for RuntimeError {
    fn from(err: CommandBuildError) -> Self {
        match err {
            CommandBuildError::NotFound(program) => Self::ExecutableNotFound(program),
            other => Self::SpawnFailed(other.to_string()),
        }
    }
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Resolve the program to an executable path.
    ///
    /// Paths containing a separator are used as given; bare names are looked
    /// up on `PATH`.
    ///
    /// # Errors
    /// Returns error if the executable cannot be found.
    pub fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable(&program).ok_or(CommandBuildError::NotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for a base command plus parameters.
///
/// The base may carry its own arguments (for example `npx claude`); it is
/// split with shell quoting rules.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    base: String,
    params: Vec<String>,
}

impl CommandBuilder {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append one parameter.
    #[must_use]
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Append parameters.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(more.into_iter().map(Into::into));
        self
    }

    /// Append a flag followed by its value.
    #[must_use]
    pub fn flag_value(self, flag: &str, value: impl Into<String>) -> Self {
        self.param(flag).param(value)
    }

    /// # Errors
    /// Returns error if the base cannot be parsed or nothing remains.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts =
            shlex::split(&self.base).ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        parts.extend(self.params.iter().cloned());

        let program = parts.remove(0);
        Ok(CommandParts { program, args: parts })
    }
}

fn resolve_executable(program: &str) -> Option<PathBuf> {
    if program.trim().is_empty() {
        return None;
    }
    let path = Path::new(program);
    if path.components().count() > 1 || path.is_absolute() {
        return path.is_file().then(|| path.to_path_buf());
    }
    which::which(program).ok()
}
