//! Observability for agent executions.
//!
//! Provides:
//! - `ObservabilityHub` - Fan-out of lifecycle events with per-backend isolation
//! - `ObservabilityBackend` - Trait implemented by every sink
//! - Console, JSONL file and PostHog backends
//! - `ObservabilityConfig` - Explicit backend configuration

pub mod backend;
pub mod backends;
pub mod config;
pub mod hub;

pub use backend::{BackendError, ErrorReport, ObservabilityBackend, RequestContext};
pub use config::{ConsoleConfig, FileLogConfig, ObservabilityConfig, PostHogConfig};
pub use hub::ObservabilityHub;
