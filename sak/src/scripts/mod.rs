//! Script discovery, description and execution
//!
//! Scripts are files in one directory whose names end with the configured
//! suffix. The `Dispatcher` is the single entry point: it parses a command,
//! then lists, describes or runs the named script.

mod descriptor;
mod dispatcher;
mod help;
mod process;
mod registry;
mod tokenizer;

pub use descriptor::{DescriptionSource, DocstringSource, ProbeSource, ScriptDescriptor, ScriptDescriptorExtractor};
pub use dispatcher::Dispatcher;
pub use help::render_help;
pub use process::{
    ExecutionResult, ProcessExecutor, ProcessSession, RunRequest, SpawnRecord, SpawnState, TERMINATED_EXIT_CODE,
};
pub use registry::ScriptRegistry;
pub use tokenizer::{Command, tokenize};
