//! Request orchestration against an agent runtime.

use std::sync::Arc;

use futures::{StreamExt, stream::BoxStream};
use relay_core::{
    AgentRuntime, ExecutorConfig, InterruptHandle, Message, ProcessedResponse, RuntimeError,
    RuntimeOptions,
};
use relay_observability::{ErrorReport, ObservabilityHub, RequestContext};
use thiserror::Error;
use tokio::time::Instant;

use crate::processor::ResponseProcessor;

/// Execution error.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Execution ended without a final response")]
    Incomplete,
}

impl ExecuteError {
    /// Stable short name reported as `error_kind`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Runtime(e) => e.kind(),
            Self::Incomplete => "incomplete",
        }
    }
}

/// One element of an execution stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A runtime message, as it arrived.
    Message(Message),
    /// The completed response. Always the last item of a successful stream.
    Final(ProcessedResponse),
}

/// Lazy, single-pass sequence of stream items. Dropping it releases the
/// runtime connection.
pub type ExecutionStream = BoxStream<'static, Result<StreamItem, ExecuteError>>;

/// Drives requests against an [`AgentRuntime`] and reports to an
/// [`ObservabilityHub`].
///
/// Cheap to clone; calls share nothing but the runtime factory and the hub.
#[derive(Clone)]
pub struct Executor {
    runtime: Arc<dyn AgentRuntime>,
    hub: Arc<ObservabilityHub>,
}

impl Executor {
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>, hub: Arc<ObservabilityHub>) -> Self {
        Self { runtime, hub }
    }

    #[must_use]
    pub fn hub(&self) -> &ObservabilityHub {
        &self.hub
    }

    /// Run a prompt to completion.
    ///
    /// # Errors
    /// Returns error if the runtime fails at any point. The error has already
    /// been reported to the hub.
    pub async fn execute(
        &self,
        prompt: &str,
        config: &ExecutorConfig,
    ) -> Result<ProcessedResponse, ExecuteError> {
        self.execute_with_interrupt(prompt, config, InterruptHandle::new())
            .await
    }

    /// Run a prompt to completion, forwarding `interrupt` to the runtime.
    ///
    /// # Errors
    /// Returns error if the runtime fails at any point.
    pub async fn execute_with_interrupt(
        &self,
        prompt: &str,
        config: &ExecutorConfig,
        interrupt: InterruptHandle,
    ) -> Result<ProcessedResponse, ExecuteError> {
        let mut stream = self.execute_stream_with_interrupt(prompt, config.clone(), interrupt);
        while let Some(item) = stream.next().await {
            if let StreamItem::Final(response) = item? {
                return Ok(response);
            }
        }
        Err(ExecuteError::Incomplete)
    }

    /// Stream every runtime message, then the final response.
    #[must_use]
    pub fn execute_stream(&self, prompt: impl Into<String>, config: ExecutorConfig) -> ExecutionStream {
        self.execute_stream_with_interrupt(prompt, config, InterruptHandle::new())
    }

    /// Like [`Self::execute_stream`], forwarding `interrupt` to the runtime.
    ///
    /// The interrupt is sent to the live connection at most once; the stream
    /// then continues until the runtime ends it.
    #[must_use]
    pub fn execute_stream_with_interrupt(
        &self,
        prompt: impl Into<String>,
        config: ExecutorConfig,
        interrupt: InterruptHandle,
    ) -> ExecutionStream {
        let runtime = Arc::clone(&self.runtime);
        let hub = Arc::clone(&self.hub);
        let prompt = prompt.into();

        Box::pin(async_stream::stream! {
            let start = Instant::now();
            let ctx = RequestContext::new(&config);
            tracing::debug!(
                request_id = %ctx.request_id,
                user_id = config.user_id(),
                platform = config.platform(),
                "Executing request"
            );
            hub.log_request_start(&ctx, &prompt);

            let mut connection = runtime.connection(RuntimeOptions::from_config(&config));
            let opened = match connection.connect().await {
                Ok(()) => match connection.submit(&prompt).await {
                    Ok(()) => connection.receive_messages(),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            let mut messages = match opened {
                Ok(messages) => messages,
                Err(e) => {
                    let err = ExecuteError::from(e);
                    report_error(&hub, &ctx, &err);
                    if let Err(e) = connection.disconnect().await {
                        tracing::debug!(request_id = %ctx.request_id, "Disconnect after failure: {e}");
                    }
                    yield Err(err);
                    return;
                }
            };

            let mut processor = ResponseProcessor::new(&hub, ctx);
            let mut interrupt_sent = false;
            loop {
                let next = tokio::select! {
                    () = interrupt.interrupted(), if !interrupt_sent => {
                        interrupt_sent = true;
                        tracing::debug!(request_id = %ctx.request_id, "Forwarding interrupt");
                        if let Err(e) = connection.interrupt().await {
                            tracing::debug!(request_id = %ctx.request_id, "Interrupt not delivered: {e}");
                        }
                        continue;
                    }
                    next = messages.next() => next,
                };

                match next {
                    Some(Ok(message)) => {
                        processor.process(&message);
                        yield Ok(StreamItem::Message(message));
                    }
                    Some(Err(e)) => {
                        let err = ExecuteError::from(e);
                        report_error(&hub, &ctx, &err);
                        drop(messages);
                        if let Err(e) = connection.disconnect().await {
                            tracing::debug!(request_id = %ctx.request_id, "Disconnect after failure: {e}");
                        }
                        yield Err(err);
                        return;
                    }
                    None => break,
                }
            }

            drop(messages);
            if let Err(e) = connection.disconnect().await {
                tracing::debug!(request_id = %ctx.request_id, "Disconnect failed: {e}");
            }

            let mut response = processor.finalize();
            response.metrics.duration_ms =
                u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            hub.log_completion(&ctx, &response);
            yield Ok(StreamItem::Final(response));
        })
    }
}

fn report_error(hub: &ObservabilityHub, ctx: &RequestContext<'_>, err: &ExecuteError) {
    tracing::warn!(request_id = %ctx.request_id, kind = err.kind(), "Request failed: {err}");
    hub.log_error(ctx, &ErrorReport::new(err.kind(), err.to_string()));
}
