//! Folds a runtime message stream into a [`ProcessedResponse`].

use relay_core::{
    ContentBlock, ExecutorConfig, Message, Metrics, ProcessedResponse, ResponseMode, ThinkingMode,
    response::unique_in_order,
};
use relay_observability::{ObservabilityHub, RequestContext};

/// Separator between tool indicators.
pub const TOOL_SEPARATOR: &str = " | ";

/// Display glyph for a tool.
#[must_use]
pub fn tool_icon(name: &str) -> &'static str {
    match name {
        "Read" => "📖",
        "Write" => "✍️",
        "Edit" => "✏️",
        "Bash" => "💻",
        "Glob" => "🔍",
        "Grep" => "🔎",
        _ => "🔧",
    }
}

/// Render `Tools used: ...` for the given invocations, or `None` if there were none.
///
/// Repeats are dropped; first-occurrence order is kept.
#[must_use]
pub fn format_tool_indicators(tool_uses: &[String]) -> Option<String> {
    if tool_uses.is_empty() {
        return None;
    }
    let rendered: Vec<String> = unique_in_order(tool_uses)
        .into_iter()
        .map(|name| format!("{} {name}", tool_icon(name)))
        .collect();
    Some(format!("Tools used: {}", rendered.join(TOOL_SEPARATOR)))
}

/// Streaming reducer for one request.
pub struct ResponseProcessor<'a> {
    config: &'a ExecutorConfig,
    hub: &'a ObservabilityHub,
    ctx: RequestContext<'a>,
    text_parts: Vec<String>,
    tool_uses: Vec<String>,
    thinking_blocks: Vec<String>,
    session_id: Option<String>,
    metrics: Metrics,
    raw_messages: Vec<Message>,
    sequence: usize,
}

impl<'a> ResponseProcessor<'a> {
    #[must_use]
    pub fn new(hub: &'a ObservabilityHub, ctx: RequestContext<'a>) -> Self {
        Self {
            config: ctx.config,
            hub,
            ctx,
            text_parts: Vec::new(),
            tool_uses: Vec::new(),
            thinking_blocks: Vec::new(),
            session_id: None,
            metrics: Metrics::default(),
            raw_messages: Vec::new(),
            sequence: 0,
        }
    }

    /// Fold one message.
    pub fn process(&mut self, message: &Message) {
        self.hub.log_message_observed(&self.ctx, message, self.sequence);
        self.sequence += 1;

        match message {
            Message::Assistant { content, .. } => {
                for block in content {
                    self.process_block(block);
                }
            }
            Message::User { .. } => {}
            Message::System { subtype, .. } => {
                tracing::trace!(subtype, "System message");
            }
            Message::Result(result) => {
                if let Some(session_id) = &result.session_id {
                    self.session_id = Some(session_id.clone());
                }
                self.metrics.runtime_duration_ms = Some(result.duration_ms);
                self.metrics.num_turns = Some(result.num_turns);
                self.metrics.total_cost_usd = result.total_cost_usd;
            }
        }

        if self.config.response_mode() == ResponseMode::BufferAll {
            self.raw_messages.push(message.clone());
        }
    }

    fn process_block(&mut self, block: &ContentBlock) {
        match block {
            ContentBlock::Text { text } => self.text_parts.push(text.clone()),
            ContentBlock::Thinking { thinking, .. } => {
                self.thinking_blocks.push(thinking.clone());
                if self.config.thinking_mode() == ThinkingMode::Include {
                    self.text_parts.push(format!("\n[Thinking: {thinking}]\n"));
                }
            }
            ContentBlock::ToolUse { name, .. } => self.tool_uses.push(name.clone()),
            ContentBlock::ToolResult { .. } => {}
            ContentBlock::Unsupported => {
                tracing::debug!(request_id = %self.ctx.request_id, "Ignoring unsupported content block");
            }
        }
    }

    /// Text accumulated so far, without indicators.
    #[must_use]
    pub fn partial_text(&self) -> String {
        self.text_parts.concat()
    }

    /// Build the response. `metrics.duration_ms` is left for the caller to set.
    #[must_use]
    pub fn finalize(self) -> ProcessedResponse {
        let mut text = self.text_parts.concat();
        if self.config.include_tool_indicators() {
            if let Some(indicators) = format_tool_indicators(&self.tool_uses) {
                text.push_str("\n\n");
                text.push_str(&indicators);
            }
        }

        ProcessedResponse {
            text: text.trim().to_string(),
            tool_uses: self.tool_uses,
            thinking_blocks: self.thinking_blocks,
            session_id: self.session_id,
            metrics: self.metrics,
            raw_messages: self.raw_messages,
        }
    }
}
