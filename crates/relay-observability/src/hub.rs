//! Fan-out dispatcher for lifecycle events.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use relay_core::{Message, ProcessedResponse};

use crate::{
    BackendError, ErrorReport, ObservabilityBackend, ObservabilityConfig, RequestContext,
    backends::{ConsoleBackend, FileBackend, PostHogBackend},
};

/// Dispatches lifecycle events to every enabled backend.
///
/// A backend that returns an error or panics is logged and skipped; it never
/// affects the other backends or the request being observed. Backends are
/// invoked in construction order.
#[derive(Clone, Default)]
pub struct ObservabilityHub {
    backends: Vec<Arc<dyn ObservabilityBackend>>,
}

impl ObservabilityHub {
    /// Create a hub. Disabled backends are dropped here and never consulted again.
    #[must_use]
    pub fn new(backends: impl IntoIterator<Item = Arc<dyn ObservabilityBackend>>) -> Self {
        let backends = backends
            .into_iter()
            .filter(|backend| {
                let enabled = backend.is_enabled();
                if !enabled {
                    tracing::debug!(backend = backend.name(), "Observability backend disabled");
                }
                enabled
            })
            .collect();
        Self { backends }
    }

    /// A hub with no backends.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build the built-in backends from explicit configuration.
    ///
    /// A backend that fails to initialize is logged and left out.
    #[must_use]
    pub fn from_config(config: &ObservabilityConfig) -> Self {
        let mut backends: Vec<Arc<dyn ObservabilityBackend>> = Vec::new();

        if let Some(posthog) = &config.posthog {
            match PostHogBackend::new(posthog.clone()) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => tracing::warn!("PostHog backend unavailable: {e}"),
            }
        }

        backends.push(Arc::new(ConsoleBackend::new(config.console.clone())));

        if config.file.enabled {
            match FileBackend::new(config.file.clone()) {
                Ok(backend) => backends.push(Arc::new(backend)),
                Err(e) => tracing::warn!("File logging backend unavailable: {e}"),
            }
        }

        Self::new(backends)
    }

    /// Names of the active backends, in dispatch order.
    #[must_use]
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Whether any backend is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn log_request_start(&self, ctx: &RequestContext<'_>, prompt: &str) {
        self.dispatch("request_start", |b| b.on_request_start(ctx, prompt));
    }

    pub fn log_message_observed(&self, ctx: &RequestContext<'_>, message: &Message, sequence: usize) {
        self.dispatch("message", |b| b.on_message(ctx, message, sequence));
    }

    pub fn log_completion(&self, ctx: &RequestContext<'_>, response: &ProcessedResponse) {
        self.dispatch("completion", |b| b.on_completion(ctx, response));
    }

    pub fn log_error(&self, ctx: &RequestContext<'_>, error: &ErrorReport) {
        self.dispatch("error", |b| b.on_error(ctx, error));
    }

    fn dispatch<F>(&self, op: &'static str, f: F)
    where
        F: Fn(&dyn ObservabilityBackend) -> Result<(), BackendError>,
    {
        for backend in &self.backends {
            match panic::catch_unwind(AssertUnwindSafe(|| f(backend.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(backend = backend.name(), op, "Observability error: {e}");
                }
                Err(_) => {
                    tracing::error!(backend = backend.name(), op, "Observability backend panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for ObservabilityHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityHub")
            .field("backends", &self.backend_names())
            .finish()
    }
}
