//! Domain events: the progress timeline streamed to the chat client.
//!
//! Serialized as tagged objects with a `type` discriminator:
//! - `thinking`: the assistant is working
//! - `tool_start`: a tool call is about to run
//! - `tool_complete`: the tool call succeeded
//! - `tool_error`: the tool call failed
//! - `response`: final answer text
//! - `done`: the stream is complete (always last)
//! - `error`: the request failed

use serde::{Deserialize, Serialize};

use crate::tool::ToolFailure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Thinking {
        text: String,
    },

    ToolStart {
        id: String,
        name: String,
        args: serde_json::Value,
    },

    ToolComplete {
        id: String,
        name: String,
        result: String,
    },

    ToolError {
        id: String,
        name: String,
        error: ToolFailure,
    },

    Response {
        text: String,
    },

    Done,

    Error {
        message: String,
    },
}

impl DomainEvent {
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking { text: text.into() }
    }

    /// The `type` discriminator for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolComplete { .. } => "tool_complete",
            Self::ToolError { .. } => "tool_error",
            Self::Response { .. } => "response",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Id of the tool call this event belongs to, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolStart { id, .. }
            | Self::ToolComplete { id, .. }
            | Self::ToolError { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;

    #[test]
    fn event_serialization_tool_start() {
        let event = DomainEvent::ToolStart {
            id: "call_1".into(),
            name: "PNRStatus".into(),
            args: serde_json::json!({"pnr": "1234567890"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_start""#));
        assert!(json.contains(r#""name":"PNRStatus""#));
        assert!(json.contains(r#""pnr":"1234567890""#));
    }

    #[test]
    fn event_serialization_tool_error_kind() {
        let event = DomainEvent::ToolError {
            id: "call_1".into(),
            name: "PNRStatus".into(),
            error: ToolFailure::new(ToolErrorKind::Transport, "timed out"),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_error");
        assert_eq!(json["error"]["kind"], "Transport");
        assert_eq!(json["error"]["message"], "timed out");
    }

    #[test]
    fn event_serialization_done_has_only_type() {
        let json = serde_json::to_string(&DomainEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }

    #[test]
    fn event_type_names() {
        assert_eq!(DomainEvent::thinking("x").event_type(), "thinking");
        assert_eq!(
            DomainEvent::Response { text: "x".into() }.event_type(),
            "response"
        );
        assert_eq!(
            DomainEvent::Error {
                message: "x".into()
            }
            .event_type(),
            "error"
        );
        assert_eq!(DomainEvent::Done.event_type(), "done");
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"response","text":"Your PNR is confirmed"}"#;
        let event: DomainEvent = serde_json::from_str(json).unwrap();
        match event {
            DomainEvent::Response { text } => assert_eq!(text, "Your PNR is confirmed"),
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn tool_call_id_only_on_tool_events() {
        assert_eq!(DomainEvent::thinking("x").tool_call_id(), None);
        let ev = DomainEvent::ToolComplete {
            id: "call_9".into(),
            name: "n".into(),
            result: "r".into(),
        };
        assert_eq!(ev.tool_call_id(), Some("call_9"));
    }
}
