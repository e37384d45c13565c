//! Tool trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::context::ToolContext;

/// A tool that can be invoked through the RPC boundary
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the `name` of a CallTool request)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        debug!("ToolResult::success: called");
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(content: impl Into<String>) -> Self {
        debug!("ToolResult::error: called");
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A request to run one tool
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub input: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_success() {
        let result = ToolResult::success("ok");
        assert!(!result.is_error);
        assert_eq!(result.content, "ok");
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("Script not found: foo");
        assert!(result.is_error);
        assert_eq!(result.content, "Script not found: foo");
    }
}
