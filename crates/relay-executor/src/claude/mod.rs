//! Claude CLI runtime over the stream-json control protocol.

pub mod protocol;
pub mod runtime;
pub mod types;

pub use protocol::{ProtocolError, ProtocolPeer};
pub use runtime::{ClaudeCliConnection, ClaudeCliRuntime, DEFAULT_CLAUDE_COMMAND};
