//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes scripts directory {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("Invalid script name: '{name}'")]
    InvalidScriptName { name: String },

    #[error("Script not found: {name}")]
    ScriptNotFound { name: String },

    #[error("Failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_violation_message() {
        let err = ToolError::SandboxViolation {
            path: PathBuf::from("/allowed-evil/x.sak.py"),
            root: PathBuf::from("/allowed"),
        };

        let msg = err.to_string();
        assert!(msg.contains("/allowed-evil/x.sak.py"));
        assert!(msg.contains("/allowed"));
    }

    #[test]
    fn test_spawn_message_names_interpreter() {
        let err = ToolError::Spawn {
            interpreter: "python9".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
        };

        let msg = err.to_string();
        assert!(msg.contains("python9"));
        assert!(msg.contains("No such file"));
    }
}
