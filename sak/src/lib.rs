//! Swiss Army Knife - local helper scripts behind a single tool
//!
//! A directory of scripts named `<name>.sak.py` becomes one tool,
//! `swiss-army-knife`, whose `command` argument lists, describes or runs them.
//!
//! # Core Concepts
//!
//! - **Fresh Discovery**: Every listing rescans the directory; there is no cache
//! - **Self-Describing Scripts**: A docstring, or the script's own `--info` answer
//! - **Contained Execution**: Names resolve only to files inside the scripts directory
//! - **Owned Processes**: Timeouts and superseded runs kill the whole process group
//!
//! # Modules
//!
//! - [`scripts`] - Discovery, description and execution of scripts
//! - [`tools`] - Tool trait, context and executor
//! - [`ipc`] - Newline-delimited JSON RPC over stdio or a Unix socket
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod ipc;
pub mod scripts;
pub mod tools;

pub use config::Config;
pub use scripts::{Dispatcher, ScriptDescriptor, ScriptRegistry};
pub use tools::{ToolContext, ToolExecutor, ToolResult};
