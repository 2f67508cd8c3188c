//! Transport layer for chat and web front-ends.
//!
//! Provides:
//! - Wire events for streamed responses (JSON)
//! - SSE adapter (feature: sse)
//! - Long-message splitting for chat platforms

pub mod chunk;
pub mod protocol;

#[cfg(feature = "sse")]
pub mod sse;

pub use chunk::split_message;
pub use protocol::{StreamEvent, event_stream};
