//! ToolExecutor - routes tool calls by name

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::scripts::Dispatcher;

use super::builtin::SwissArmyKnifeTool;
use super::{Tool, ToolCall, ToolContext, ToolDefinition, ToolError, ToolResult};

/// Registered tools, keyed by name
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Executor with the swiss-army-knife tool wired to `config`
    pub fn standard(config: &Config) -> Self {
        debug!("ToolExecutor::standard: called");
        let dispatcher = Arc::new(Dispatcher::from_config(&config.scripts));
        let mut executor = Self::empty();
        executor.add_tool(Box::new(SwissArmyKnifeTool::new(dispatcher)));
        executor
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        debug!("ToolExecutor::empty: called");
        Self { tools: HashMap::new() }
    }

    /// Add a tool, replacing any tool with the same name
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        debug!("ToolExecutor::definitions: called");
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => {
                debug!("ToolExecutor::execute: tool found, executing");
                tool.execute(tool_call.input.clone(), ctx).await
            }
            None => {
                debug!("ToolExecutor::execute: unknown tool");
                ToolResult::error(ToolError::UnknownTool {
                    name: tool_call.name.clone(),
                }
                .to_string())
            }
        }
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        debug!(%name, "ToolExecutor::has_tool: called");
        self.tools.contains_key(name)
    }

    /// Get tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        debug!("ToolExecutor::tool_names: called");
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tempfile::tempdir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the input back"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::success(input.to_string())
        }
    }

    #[test]
    fn test_standard_executor_has_swiss_army_knife() {
        let executor = ToolExecutor::standard(&Config::default());

        assert!(executor.has_tool("swiss-army-knife"));
        assert_eq!(executor.tool_names(), vec!["swiss-army-knife".to_string()]);
    }

    #[test]
    fn test_definitions_sorted() {
        let mut executor = ToolExecutor::standard(&Config::default());
        executor.add_tool(Box::new(EchoTool));

        let names: Vec<_> = executor.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "swiss-army-knife"]);
    }

    #[test]
    fn test_empty_executor() {
        let executor = ToolExecutor::empty();
        assert!(executor.definitions().is_empty());
        assert!(!executor.has_tool("echo"));
    }

    #[tokio::test]
    async fn test_execute_known_tool() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let mut executor = ToolExecutor::empty();
        executor.add_tool(Box::new(EchoTool));

        let call = ToolCall {
            name: "echo".to_string(),
            input: json!({ "a": 1 }),
        };
        let result = executor.execute(&call, &ctx).await;
        assert_eq!(result, ToolResult::success(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf());
        let executor = ToolExecutor::empty();

        let call = ToolCall {
            name: "nonexistent".to_string(),
            input: json!({}),
        };
        let result = executor.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Unknown tool"));
    }
}
