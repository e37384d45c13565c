//! RPC message types
//!
//! Each message is a single line of JSON followed by `\n`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{ToolDefinition, ToolResult};

/// Request from a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: u64,

    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RequestBody {
    /// List registered tools
    ListTools,

    /// Run one tool
    CallTool {
        name: String,

        #[serde(default)]
        arguments: Value,

        /// Calls sharing a session key supersede each other
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },

    /// Liveness check
    Ping,
}

/// Response to a request; `id` is `None` when the request id was unreadable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: Option<u64>,

    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ResponseBody {
    Tools { tools: Vec<ToolDefinition> },

    Result { content: String, is_error: bool },

    Pong { version: String },

    /// Protocol-level failure (bad frame, bad request); tool failures use `Result`
    Error { message: String },
}

impl Response {
    pub fn new(id: Option<u64>, body: ResponseBody) -> Self {
        Self { id, body }
    }

    pub fn error(id: Option<u64>, message: impl Into<String>) -> Self {
        Self::new(
            id,
            ResponseBody::Error {
                message: message.into(),
            },
        )
    }
}

impl From<ToolResult> for ResponseBody {
    fn from(result: ToolResult) -> Self {
        ResponseBody::Result {
            content: result.content,
            is_error: result.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_serialize() {
        let req = Request {
            id: 1,
            body: RequestBody::Ping,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"id":1,"type":"Ping"}"#);
    }

    #[test]
    fn test_call_tool_deserialize() {
        let json = r#"{"id":7,"type":"CallTool","name":"swiss-army-knife","arguments":{"command":"--list"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request {
                id: 7,
                body: RequestBody::CallTool {
                    name: "swiss-army-knife".to_string(),
                    arguments: json!({ "command": "--list" }),
                    session: None,
                },
            }
        );
    }

    #[test]
    fn test_call_tool_with_session() {
        let json = r#"{"id":2,"type":"CallTool","name":"t","arguments":{},"session":"chat-1"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert!(matches!(req.body, RequestBody::CallTool { session: Some(ref s), .. } if s == "chat-1"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"id":3,"type":"Shutdown"}"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn test_result_response_serialize() {
        let resp = Response::new(Some(4), ToolResult::error("boom").into());
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"id":4,"type":"Result","content":"boom","is_error":true}"#);
    }

    #[test]
    fn test_error_response_without_id() {
        let resp = Response::error(None, "bad frame");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"id":null,"type":"Error","message":"bad frame"}"#);

        let back: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
