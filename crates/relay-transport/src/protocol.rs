//! Wire events for streamed responses.

use futures::{StreamExt, stream::BoxStream};
use relay_core::{ContentBlock, Message};
use relay_executor::{ExecutionStream, StreamItem};
use serde::{Deserialize, Serialize};

/// Event sent to a streaming client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Answer text, as it arrives.
    Text { content: String },
    /// The agent invoked a tool.
    ToolUse { name: String, id: String },
    /// Reasoning. Only sent when the client asked for it.
    Thinking { content: String },
    /// The runtime finished the request.
    Result {
        subtype: String,
        duration_ms: u64,
        num_turns: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
    },
    /// Wall-clock duration measured by the executor.
    Metrics { duration_ms: u64 },
    /// End of a successful stream.
    Done,
    /// The request failed. Nothing follows.
    Error { message: String },
}

impl StreamEvent {
    /// Whether no event follows this one.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Serialize to a single JSON line.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream event: {e}");
            r#"{"type":"error","message":"serialization failed"}"#.to_string()
        })
    }

    /// Events for one execution stream item.
    ///
    /// The final response becomes `metrics` followed by `done`.
    #[must_use]
    pub fn from_item(item: &StreamItem, include_thinking: bool) -> Vec<Self> {
        match item {
            StreamItem::Message(message) => Self::from_message(message, include_thinking),
            StreamItem::Final(response) => vec![
                Self::Metrics {
                    duration_ms: response.metrics.duration_ms,
                },
                Self::Done,
            ],
        }
    }

    fn from_message(message: &Message, include_thinking: bool) -> Vec<Self> {
        match message {
            Message::Assistant { content, .. } => content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(Self::Text {
                        content: text.clone(),
                    }),
                    ContentBlock::ToolUse { id, name, .. } => Some(Self::ToolUse {
                        name: name.clone(),
                        id: id.clone(),
                    }),
                    ContentBlock::Thinking { thinking, .. } if include_thinking => {
                        Some(Self::Thinking {
                            content: thinking.clone(),
                        })
                    }
                    ContentBlock::Thinking { .. }
                    | ContentBlock::ToolResult { .. }
                    | ContentBlock::Unsupported => None,
                })
                .collect(),
            Message::Result(result) => vec![Self::Result {
                subtype: result.subtype.clone(),
                duration_ms: result.duration_ms,
                num_turns: result.num_turns,
                total_cost_usd: result.total_cost_usd,
            }],
            Message::User { .. } | Message::System { .. } => Vec::new(),
        }
    }
}

/// Map an execution stream to wire events.
///
/// The stream ends with exactly one terminal event: `done` after the final
/// response, or `error` on the first failure.
#[must_use]
pub fn event_stream(
    mut execution: ExecutionStream,
    include_thinking: bool,
) -> BoxStream<'static, StreamEvent> {
    async_stream::stream! {
        while let Some(item) = execution.next().await {
            match item {
                Ok(item) => {
                    for event in StreamEvent::from_item(&item, include_thinking) {
                        yield event;
                    }
                    if matches!(item, StreamItem::Final(_)) {
                        return;
                    }
                }
                Err(e) => {
                    yield StreamEvent::Error {
                        message: e.to_string(),
                    };
                    return;
                }
            }
        }
        tracing::warn!("Execution stream ended without a final response");
        yield StreamEvent::Error {
            message: "stream ended unexpectedly".to_string(),
        };
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::{AgentRuntime, ExecutorConfig, ResponseMode, ResultMessage, RuntimeError};
    use relay_executor::{
        Executor,
        testing::{ScriptedRuntime, Step},
    };
    use relay_observability::ObservabilityHub;

    use super::*;

    fn run(steps: Vec<Step>, include_thinking: bool) -> BoxStream<'static, StreamEvent> {
        let executor = Executor::new(
            Arc::new(ScriptedRuntime::new(steps)) as Arc<dyn AgentRuntime>,
            Arc::new(ObservabilityHub::disabled()),
        );
        let config = ExecutorConfig::builder("u", "web")
            .response_mode(ResponseMode::Stream)
            .build()
            .unwrap();
        event_stream(executor.execute_stream("hi", config), include_thinking)
    }

    fn answer() -> Vec<Step> {
        vec![
            Step::Message(Message::assistant(vec![
                ContentBlock::thinking("plan"),
                ContentBlock::text("Hello"),
                ContentBlock::tool_use("t1", "Read"),
            ])),
            Step::Message(Message::Result(ResultMessage::success("s1", 40))),
        ]
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let events: Vec<_> = run(answer(), false).collect().await;

        assert_eq!(events[0], StreamEvent::Text { content: "Hello".into() });
        assert_eq!(
            events[1],
            StreamEvent::ToolUse {
                name: "Read".into(),
                id: "t1".into()
            }
        );
        assert!(matches!(
            events[2],
            StreamEvent::Result { duration_ms: 40, num_turns: 1, .. }
        ));
        assert!(matches!(events[3], StreamEvent::Metrics { .. }));
        assert_eq!(events[4], StreamEvent::Done);
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_thinking_only_when_requested() {
        let events: Vec<_> = run(answer(), true).collect().await;
        assert_eq!(events[0], StreamEvent::Thinking { content: "plan".into() });
    }

    #[tokio::test]
    async fn test_failure_ends_with_single_error() {
        let events: Vec<_> = run(
            vec![
                Step::Message(Message::assistant(vec![ContentBlock::text("part")])),
                Step::Fail(RuntimeError::Protocol("bad frame".into())),
            ],
            false,
        )
        .collect()
        .await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Error { message } => assert!(message.contains("bad frame")),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(StreamEvent::Done.to_json(), r#"{"type":"done"}"#);
        assert_eq!(
            StreamEvent::ToolUse {
                name: "Bash".into(),
                id: "x".into()
            }
            .to_json(),
            r#"{"type":"tool_use","name":"Bash","id":"x"}"#
        );
        let parsed: StreamEvent =
            serde_json::from_str(r#"{"type":"metrics","duration_ms":12}"#).unwrap();
        assert_eq!(parsed, StreamEvent::Metrics { duration_ms: 12 });
    }
}
