//! Line-delimited JSON exchanged with the Claude CLI in stream-json mode.

use relay_core::{ContentBlock, Message, ResultMessage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A line printed by the CLI on stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CliMessage {
    Assistant {
        message: AssistantPayload,
    },
    User {
        message: UserPayload,
    },
    System {
        #[serde(default)]
        subtype: String,
        #[serde(flatten)]
        data: Map<String, Value>,
    },
    Result(ResultMessage),
    ControlRequest {
        request_id: String,
        request: Value,
    },
    ControlResponse {
        #[serde(default)]
        response: Value,
    },
    /// Partial-message events and other kinds not relayed.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantPayload {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub content: UserContent,
}

/// User content is either a bare string or a list of blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl CliMessage {
    /// Convert to a relayed message. Control traffic and unknown kinds yield `None`.
    #[must_use]
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Assistant { message } => Some(Message::Assistant {
                content: message.content,
                model: message.model,
            }),
            Self::User { message } => {
                let content = match message.content {
                    UserContent::Text(text) => vec![ContentBlock::text(text)],
                    UserContent::Blocks(blocks) => blocks,
                };
                Some(Message::User { content })
            }
            Self::System { subtype, data } => Some(Message::System { subtype, data }),
            Self::Result(result) => Some(Message::Result(result)),
            Self::ControlRequest { .. } | Self::ControlResponse { .. } | Self::Other => None,
        }
    }
}

/// A line written to the CLI on stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outgoing {
    User {
        message: OutgoingUser,
        parent_tool_use_id: Option<String>,
        session_id: String,
    },
    ControlRequest {
        request_id: String,
        request: ControlRequest,
    },
    ControlResponse {
        response: ControlResponse,
    },
}

impl Outgoing {
    /// A user turn carrying the prompt.
    #[must_use]
    pub fn user(prompt: impl Into<String>) -> Self {
        Self::User {
            message: OutgoingUser {
                role: "user",
                content: prompt.into(),
            },
            parent_tool_use_id: None,
            session_id: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingUser {
    pub role: &'static str,
    pub content: String,
}

/// Requests the relay sends to the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlRequest {
    Initialize { hooks: Option<Value> },
    Interrupt {},
}

/// Answer to a request the CLI sends to the relay. Every such request is declined.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ControlResponse {
    Error {
        request_id: String,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(line: &str) -> CliMessage {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_assistant_line() {
        let message = parse(
            r#"{"type":"assistant","message":{"id":"m1","model":"claude-x","content":[{"type":"text","text":"hi"},{"type":"tool_use","id":"t1","name":"Read","input":{"path":"a"}}]},"session_id":"s1"}"#,
        )
        .into_message()
        .unwrap();
        assert_eq!(message.kind(), "assistant");
        assert_eq!(message.blocks().len(), 2);
        assert!(matches!(&message.blocks()[1], ContentBlock::ToolUse { name, .. } if name == "Read"));
    }

    #[test]
    fn test_user_string_content_becomes_text_block() {
        let message = parse(r#"{"type":"user","message":{"role":"user","content":"plain"}}"#)
            .into_message()
            .unwrap();
        assert_eq!(message.blocks(), &[ContentBlock::text("plain")]);
    }

    #[test]
    fn test_system_and_result_lines() {
        let system = parse(r#"{"type":"system","subtype":"init","session_id":"s1","tools":["Read"]}"#)
            .into_message()
            .unwrap();
        let Message::System { subtype, data } = system else {
            panic!("expected system message");
        };
        assert_eq!(subtype, "init");
        assert_eq!(data["session_id"], "s1");

        let result = parse(
            r#"{"type":"result","subtype":"success","is_error":false,"duration_ms":120,"num_turns":2,"session_id":"s9","total_cost_usd":0.01,"result":"done"}"#,
        )
        .into_message()
        .unwrap();
        let Message::Result(result) = result else {
            panic!("expected result message");
        };
        assert_eq!(result.session_id.as_deref(), Some("s9"));
        assert_eq!(result.num_turns, 2);
    }

    #[test]
    fn test_control_and_unknown_lines_are_not_relayed() {
        assert!(
            parse(r#"{"type":"control_request","request_id":"r1","request":{"subtype":"can_use_tool"}}"#)
                .into_message()
                .is_none()
        );
        assert!(parse(r#"{"type":"stream_event","event":{}}"#).into_message().is_none());
    }

    #[test]
    fn test_outgoing_shapes() {
        assert_eq!(
            serde_json::to_value(Outgoing::user("hello")).unwrap(),
            json!({
                "type": "user",
                "message": {"role": "user", "content": "hello"},
                "parent_tool_use_id": null,
                "session_id": "default",
            })
        );
        assert_eq!(
            serde_json::to_value(Outgoing::ControlRequest {
                request_id: "req_1".into(),
                request: ControlRequest::Interrupt {},
            })
            .unwrap(),
            json!({"type": "control_request", "request_id": "req_1", "request": {"subtype": "interrupt"}})
        );
        assert_eq!(
            serde_json::to_value(Outgoing::ControlResponse {
                response: ControlResponse::Error {
                    request_id: "r1".into(),
                    error: "unsupported".into(),
                },
            })
            .unwrap(),
            json!({"type": "control_response", "response": {"subtype": "error", "request_id": "r1", "error": "unsupported"}})
        );
    }
}
