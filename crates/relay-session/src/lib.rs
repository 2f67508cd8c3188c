//! Per-user conversation state for chat front-ends.
//!
//! Provides:
//! - `SessionStore` - Durable per-user records (file, memory)
//! - `ConversationManager` - The message flow shared by every front-end

pub mod manager;
pub mod record;
pub mod store;

pub use manager::{
    ConversationManager, ConversationSettings, ConversationStatus, DEFAULT_ALLOWED_TOOLS,
    DEFAULT_SYSTEM_PROMPT, EMPTY_REPLY, ManagerError, Reply,
};
pub use record::{SessionPatch, SessionRecord};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
