//! PostHog analytics over the batch capture API.

use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_core::{ExecutorConfig, ProcessedResponse};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::{runtime::Handle, sync::mpsc, time::MissedTickBehavior};

use crate::{BackendError, ErrorReport, ObservabilityBackend, PostHogConfig, RequestContext};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
struct CaptureEvent {
    event: &'static str,
    distinct_id: String,
    properties: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    api_key: &'a str,
    batch: &'a [CaptureEvent],
}

/// Sends `llm_request_start`, `llm_completion` and `llm_error` events.
///
/// Capturing never blocks: events go onto a channel drained by a background
/// task that posts them in batches. Delivery failures are logged and dropped.
#[derive(Debug)]
pub struct PostHogBackend {
    enabled: bool,
    tx: mpsc::UnboundedSender<CaptureEvent>,
}

impl PostHogBackend {
    /// Start the delivery task on the current tokio runtime.
    ///
    /// # Errors
    /// Returns error if called outside a runtime or the HTTP client cannot be built.
    pub fn new(config: PostHogConfig) -> Result<Self, BackendError> {
        let handle = Handle::try_current()
            .map_err(|e| BackendError::Unavailable(format!("no tokio runtime: {e}")))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("HTTP client: {e}")))?;

        let enabled = !config.api_key.trim().is_empty();
        let (tx, rx) = mpsc::unbounded_channel();
        if enabled {
            tracing::debug!(host = %config.host, "PostHog backend initialized");
            handle.spawn(deliver(client, config, rx));
        }

        Ok(Self { enabled, tx })
    }

    fn capture(&self, ctx: &RequestContext<'_>, event: &'static str, properties: Map<String, Value>) {
        let event = CaptureEvent {
            event,
            distinct_id: ctx.config.user_id().to_string(),
            properties,
            timestamp: Utc::now(),
        };
        if self.tx.send(event).is_err() {
            tracing::debug!("PostHog delivery task stopped; event dropped");
        }
    }
}

impl ObservabilityBackend for PostHogBackend {
    fn name(&self) -> &'static str {
        "posthog"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn on_request_start(&self, ctx: &RequestContext<'_>, prompt: &str) -> Result<(), BackendError> {
        self.capture(ctx, "llm_request_start", start_properties(ctx, prompt));
        Ok(())
    }

    fn on_completion(
        &self,
        ctx: &RequestContext<'_>,
        response: &ProcessedResponse,
    ) -> Result<(), BackendError> {
        self.capture(ctx, "llm_completion", completion_properties(ctx, response));
        Ok(())
    }

    fn on_error(&self, ctx: &RequestContext<'_>, error: &ErrorReport) -> Result<(), BackendError> {
        self.capture(ctx, "llm_error", error_properties(ctx, error));
        Ok(())
    }
}

fn base_properties(ctx: &RequestContext<'_>, fields: Value) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("platform".into(), Value::from(ctx.config.platform()));
    properties.insert("request_id".into(), Value::from(ctx.request_id.to_string()));
    if let Value::Object(fields) = fields {
        properties.extend(fields);
    }
    merge_metadata(&mut properties, ctx.config);
    properties
}

fn merge_metadata(properties: &mut Map<String, Value>, config: &ExecutorConfig) {
    for (key, value) in config.metadata() {
        properties.insert(key.clone(), value.clone());
    }
}

fn start_properties(ctx: &RequestContext<'_>, prompt: &str) -> Map<String, Value> {
    base_properties(
        ctx,
        json!({
            "prompt_length": prompt.len(),
            "has_session": ctx.config.has_session(),
            "thinking_mode": ctx.config.thinking_mode(),
            "response_mode": ctx.config.response_mode(),
        }),
    )
}

fn completion_properties(ctx: &RequestContext<'_>, response: &ProcessedResponse) -> Map<String, Value> {
    base_properties(
        ctx,
        json!({
            "response_length": response.text.len(),
            "tool_uses": response.tool_uses.len(),
            "tool_list": response.tool_uses,
            "thinking_blocks": response.thinking_blocks.len(),
            "duration_ms": response.metrics.duration_ms,
            "has_session": response.session_id.is_some(),
        }),
    )
}

fn error_properties(ctx: &RequestContext<'_>, error: &ErrorReport) -> Map<String, Value> {
    base_properties(
        ctx,
        json!({
            "error_type": error.kind,
            "error_message": error.message,
        }),
    )
}

async fn deliver(client: Client, config: PostHogConfig, mut rx: mpsc::UnboundedReceiver<CaptureEvent>) {
    let endpoint = format!("{}/batch/", config.host.trim_end_matches('/'));
    let batch_size = config.batch_size.max(1);
    let mut pending: Vec<CaptureEvent> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                pending.push(event);
                if pending.len() >= batch_size {
                    flush(&client, &endpoint, &config.api_key, &mut pending).await;
                }
            }
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush(&client, &endpoint, &config.api_key, &mut pending).await;
                }
            }
        }
    }

    if !pending.is_empty() {
        flush(&client, &endpoint, &config.api_key, &mut pending).await;
    }
    tracing::debug!("PostHog delivery task finished");
}

async fn flush(client: &Client, endpoint: &str, api_key: &str, pending: &mut Vec<CaptureEvent>) {
    let payload = BatchPayload {
        api_key,
        batch: pending,
    };
    match client.post(endpoint).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            tracing::trace!(events = pending.len(), "PostHog batch delivered");
        }
        Ok(response) => {
            tracing::warn!(status = %response.status(), events = pending.len(), "PostHog rejected batch");
        }
        Err(e) => {
            tracing::warn!(events = pending.len(), "PostHog delivery failed: {e}");
        }
    }
    pending.clear();
}

#[cfg(test)]
mod tests {
    use relay_core::{Metrics, ThinkingMode};

    use super::*;

    fn config() -> ExecutorConfig {
        ExecutorConfig::builder("u7", "slack")
            .session_id(Some("s1".into()))
            .thinking_mode(ThinkingMode::LogOnly)
            .metadata("channel", json!("C123"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_properties() {
        let config = config();
        let ctx = RequestContext::new(&config);
        let props = start_properties(&ctx, "hello");

        assert_eq!(props["platform"], "slack");
        assert_eq!(props["prompt_length"], 5);
        assert_eq!(props["has_session"], true);
        assert_eq!(props["thinking_mode"], "log_only");
        assert_eq!(props["response_mode"], "buffer_text");
        assert_eq!(props["channel"], "C123");
    }

    #[test]
    fn test_completion_and_error_properties() {
        let config = config();
        let ctx = RequestContext::new(&config);
        let response = ProcessedResponse {
            text: "four".into(),
            tool_uses: vec!["Read".into(), "Read".into()],
            thinking_blocks: vec!["t".into()],
            metrics: Metrics {
                duration_ms: 120,
                ..Metrics::default()
            },
            ..Default::default()
        };

        let props = completion_properties(&ctx, &response);
        assert_eq!(props["response_length"], 4);
        assert_eq!(props["tool_uses"], 2);
        assert_eq!(props["tool_list"], json!(["Read", "Read"]));
        assert_eq!(props["thinking_blocks"], 1);
        assert_eq!(props["duration_ms"], 120);
        assert_eq!(props["has_session"], false);

        let props = error_properties(&ctx, &ErrorReport::new("spawn", "missing binary"));
        assert_eq!(props["error_type"], "spawn");
        assert_eq!(props["error_message"], "missing binary");
        assert_eq!(props["channel"], "C123");
    }

    #[test]
    fn test_requires_runtime() {
        let err = PostHogBackend::new(PostHogConfig::new("phc_key")).unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_blank_key_is_disabled() {
        let backend = PostHogBackend::new(PostHogConfig::new("")).unwrap();
        assert!(!backend.is_enabled());

        let backend = PostHogBackend::new(PostHogConfig::new("phc_key")).unwrap();
        assert!(backend.is_enabled());
    }
}
