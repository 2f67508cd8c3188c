//! Core contracts for relaying prompts to an external agent runtime.
//!
//! This crate provides the data passed into and out of an execution:
//! - `ExecutorConfig` - Immutable per-request configuration
//! - `ProcessedResponse` - Normalized result of one request
//! - `Message` - Closed union of messages streamed by the agent runtime
//! - `AgentRuntime` / `AgentConnection` - The consumed runtime capability

pub mod config;
pub mod message;
pub mod response;
pub mod traits;

pub use config::{ConfigError, ExecutorConfig, ExecutorConfigBuilder, ResponseMode, ThinkingMode};
pub use message::{ContentBlock, Message, ResultMessage};
pub use response::{Metrics, ProcessedResponse};
pub use traits::{
    AgentConnection, AgentRuntime, InterruptHandle, MessageStream, RuntimeError, RuntimeOptions,
    SettingSource,
};
