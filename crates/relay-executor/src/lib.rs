//! Prompt execution against an agent runtime.
//!
//! Provides:
//! - `Executor` - Drives one request and reports it to observability
//! - `ResponseProcessor` - Folds runtime messages into a `ProcessedResponse`
//! - `claude` - The Claude CLI runtime over the stream-json protocol
//! - Command building utilities

pub mod claude;
pub mod command;
pub mod executor;
pub mod processor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use claude::{ClaudeCliRuntime, DEFAULT_CLAUDE_COMMAND};
pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use executor::{ExecuteError, ExecutionStream, Executor, StreamItem};
pub use processor::{ResponseProcessor, format_tool_indicators, tool_icon};
