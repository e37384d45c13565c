//! Tool system behind the RPC boundary
//!
//! A tool receives a JSON payload and answers with text plus an error flag.
//! Every call gets a `ToolContext` scoped to the scripts directory - tools
//! cannot resolve paths outside of it.

mod context;
mod error;
mod executor;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::ToolExecutor;
pub use traits::{Tool, ToolCall, ToolDefinition, ToolResult};
