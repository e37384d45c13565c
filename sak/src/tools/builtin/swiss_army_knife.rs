//! swiss-army-knife tool - list, describe and run scripts

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::scripts::Dispatcher;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub const TOOL_NAME: &str = "swiss-army-knife";

/// Single tool fronting the script dispatcher
pub struct SwissArmyKnifeTool {
    dispatcher: Arc<Dispatcher>,
}

impl SwissArmyKnifeTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Tool for SwissArmyKnifeTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Run local helper scripts. Use '--list' to see available scripts, '--info <name>' for details, \
         '--help' for authoring instructions, or '<name> [args]' to run one."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "'--list', '--help', '--info <name>', or '<name> [args]'"
                },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Extra arguments appended after those in command"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SwissArmyKnifeTool::execute: called");
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => {
                debug!("SwissArmyKnifeTool::execute: missing command parameter");
                return ToolResult::error(ToolError::InvalidArgument("command is required".to_string()).to_string());
            }
        };

        let args = match &input["args"] {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().map(stringify_arg).collect(),
            other => {
                debug!(?other, "SwissArmyKnifeTool::execute: args is not an array");
                return ToolResult::error(ToolError::InvalidArgument("args must be an array".to_string()).to_string());
            }
        };

        self.dispatcher.handle(command, &args, ctx).await
    }
}

fn stringify_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
