//! Server-sent events adapter.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use futures::{Stream, StreamExt, stream::BoxStream};

use crate::StreamEvent;

impl StreamEvent {
    /// Event name used on the SSE channel.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::Thinking { .. } => "thinking",
            Self::Result { .. } => "result",
            Self::Metrics { .. } => "metrics",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Convert to an SSE event carrying the JSON payload.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default().event(self.name()).data(self.to_json())
    }
}

/// Boxed SSE event stream.
pub type EventStream = BoxStream<'static, Result<Event, Infallible>>;

/// SSE stream of wire events.
#[must_use]
pub fn sse_stream(events: impl Stream<Item = StreamEvent> + Send + 'static) -> EventStream {
    events.map(|e| Ok(e.to_sse_event())).boxed()
}

/// Axum response for a wire-event stream, with keep-alive comments.
#[must_use]
pub fn sse_response(
    events: impl Stream<Item = StreamEvent> + Send + 'static,
) -> Sse<KeepAliveStream<EventStream>> {
    Sse::new(sse_stream(events)).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[tokio::test]
    async fn test_sse_stream_preserves_order() {
        let events = futures::stream::iter(vec![
            StreamEvent::Text { content: "a".into() },
            StreamEvent::Done,
        ]);
        let out: Vec<_> = sse_stream(events).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(StreamEvent::Done.name(), "done");
    }

    #[tokio::test]
    async fn test_sse_response_is_event_stream() {
        let events = futures::stream::iter(vec![StreamEvent::Done]);
        let response = sse_response(events).into_response();
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/event-stream"
        );
    }
}
