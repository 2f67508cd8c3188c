//! Messages streamed by the agent runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A content block inside an assistant or user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Answer text.
    Text { text: String },
    /// A tool invocation requested by the agent.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Output of a tool invocation.
    ToolResult {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Reasoning emitted separately from the answer.
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A block kind this crate does not interpret.
    #[serde(other)]
    Unsupported,
}

impl ContentBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a thinking block.
    #[must_use]
    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            thinking: thinking.into(),
            signature: None,
        }
    }

    /// Create a tool-use block with empty input.
    #[must_use]
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input: Value::Object(Map::new()),
        }
    }
}

/// Terminal message of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: String,
    /// Session handle for resuming the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    /// Final summary text reported by the runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_api_ms: Option<u64>,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl ResultMessage {
    /// Create a successful result carrying a session handle.
    #[must_use]
    pub fn success(session_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            subtype: "success".to_string(),
            session_id: Some(session_id.into()),
            is_error: false,
            result: None,
            duration_ms,
            duration_api_ms: None,
            num_turns: 1,
            total_cost_usd: None,
            usage: None,
        }
    }
}

/// A message from the agent runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Content produced by the agent.
    Assistant {
        content: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Content fed back to the agent, usually tool results.
    User { content: Vec<ContentBlock> },
    /// Runtime notice (init, compaction, ...).
    System {
        subtype: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        data: Map<String, Value>,
    },
    /// End of the request.
    Result(ResultMessage),
}

impl Message {
    /// Create an assistant message.
    #[must_use]
    pub const fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::Assistant {
            content,
            model: None,
        }
    }

    /// Short name of the message kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Assistant { .. } => "assistant",
            Self::User { .. } => "user",
            Self::System { .. } => "system",
            Self::Result(_) => "result",
        }
    }

    /// Content blocks carried by the message, if any.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Assistant { content, .. } | Self::User { content } => content,
            Self::System { .. } | Self::Result(_) => &[],
        }
    }

    /// Whether this message ends the request.
    #[must_use]
    pub const fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_block_kind_is_unsupported() {
        let block: ContentBlock =
            serde_json::from_str(r#"{"type":"redacted_thinking","data":"xyz"}"#).unwrap();
        assert_eq!(block, ContentBlock::Unsupported);
    }

    #[test]
    fn test_result_defaults() {
        let msg: Message = serde_json::from_str(
            r#"{"type":"result","subtype":"success","session_id":"s1","duration_ms":120}"#,
        )
        .unwrap();
        let Message::Result(result) = msg else {
            panic!("expected result");
        };
        assert_eq!(result.session_id.as_deref(), Some("s1"));
        assert_eq!(result.duration_ms, 120);
        assert!(!result.is_error);
        assert_eq!(result.total_cost_usd, None);
    }

    #[test]
    fn test_blocks_accessor() {
        let msg = Message::assistant(vec![ContentBlock::text("hi"), ContentBlock::tool_use("t1", "Bash")]);
        assert_eq!(msg.blocks().len(), 2);
        assert_eq!(msg.kind(), "assistant");
        assert!(Message::Result(ResultMessage::success("s", 1)).blocks().is_empty());
    }
}
