//! Development logging through `tracing`.

use relay_core::{Message, ProcessedResponse};

use crate::{BackendError, ConsoleConfig, ErrorReport, ObservabilityBackend, RequestContext};

/// Logs a one-line summary per lifecycle event.
#[derive(Debug, Clone)]
pub struct ConsoleBackend {
    enabled: bool,
}

impl ConsoleBackend {
    #[must_use]
    pub const fn new(config: ConsoleConfig) -> Self {
        Self {
            enabled: config.enabled,
        }
    }
}

impl ObservabilityBackend for ConsoleBackend {
    fn name(&self) -> &'static str {
        "console"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_request_start(&self, ctx: &RequestContext<'_>, prompt: &str) -> Result<(), BackendError> {
        tracing::info!(
            target: "relay_observability::console",
            request_id = %ctx.request_id,
            user_id = ctx.config.user_id(),
            platform = ctx.config.platform(),
            prompt_len = prompt.len(),
            has_session = ctx.config.has_session(),
            "Request start"
        );
        Ok(())
    }

    fn on_message(
        &self,
        ctx: &RequestContext<'_>,
        message: &Message,
        sequence: usize,
    ) -> Result<(), BackendError> {
        tracing::debug!(
            target: "relay_observability::console",
            request_id = %ctx.request_id,
            sequence,
            kind = message.kind(),
            blocks = message.blocks().len(),
            "Message received"
        );
        Ok(())
    }

    fn on_completion(
        &self,
        ctx: &RequestContext<'_>,
        response: &ProcessedResponse,
    ) -> Result<(), BackendError> {
        tracing::info!(
            target: "relay_observability::console",
            request_id = %ctx.request_id,
            response_len = response.text.len(),
            tools = response.tool_uses.len(),
            duration_ms = response.metrics.duration_ms,
            "Request complete"
        );
        Ok(())
    }

    fn on_error(&self, ctx: &RequestContext<'_>, error: &ErrorReport) -> Result<(), BackendError> {
        tracing::warn!(
            target: "relay_observability::console",
            request_id = %ctx.request_id,
            kind = %error.kind,
            "Request error: {}",
            error.message
        );
        Ok(())
    }
}
