//! Backend trait and the data handed to backends.

use relay_core::{ExecutorConfig, Message, ProcessedResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Identifies the request an event belongs to.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Correlates every event of one execution.
    pub request_id: Uuid,
    pub config: &'a ExecutorConfig,
}

impl<'a> RequestContext<'a> {
    /// Create a context with a fresh request id.
    #[must_use]
    pub fn new(config: &'a ExecutorConfig) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            config,
        }
    }
}

/// A request-level failure, as reported to backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

impl ErrorReport {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A sink for request lifecycle events.
///
/// Every method defaults to a no-op, so backends implement only what they
/// record. Methods are called synchronously by the hub; backends that talk to
/// the network should queue and return.
pub trait ObservabilityBackend: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Checked once, when the hub is constructed.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Called when a request starts.
    fn on_request_start(&self, _ctx: &RequestContext<'_>, _prompt: &str) -> Result<(), BackendError> {
        Ok(())
    }

    /// Called for each message received from the runtime.
    fn on_message(
        &self,
        _ctx: &RequestContext<'_>,
        _message: &Message,
        _sequence: usize,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Called when a request completes.
    fn on_completion(
        &self,
        _ctx: &RequestContext<'_>,
        _response: &ProcessedResponse,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Called when a request fails.
    fn on_error(&self, _ctx: &RequestContext<'_>, _error: &ErrorReport) -> Result<(), BackendError> {
        Ok(())
    }
}
