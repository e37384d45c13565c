//! Command dispatch
//!
//! Routes a raw command string to help, listing, description lookup or
//! script execution. Every outcome, including internal failures, comes back
//! as a `ToolResult`; nothing propagates past `handle`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ScriptsConfig;
use crate::tools::{ToolContext, ToolError, ToolResult};

use super::descriptor::ScriptDescriptorExtractor;
use super::help::render_help;
use super::process::{ExecutionResult, ProcessExecutor, RunRequest};
use super::registry::ScriptRegistry;
use super::tokenizer::Command;

pub const HELP_VERB: &str = "--help";
pub const LIST_VERB: &str = "--list";
pub const INFO_VERB: &str = "--info";

/// Listing entry rendered by `--list`
#[derive(Debug, Serialize)]
struct ListEntry<'a> {
    name: &'a str,
    description: &'a str,
}

/// Entry point used by the swiss-army-knife tool
#[derive(Clone)]
pub struct Dispatcher {
    config: ScriptsConfig,
    registry: ScriptRegistry,
    executor: ProcessExecutor,
}

impl Dispatcher {
    pub fn new(config: ScriptsConfig, registry: ScriptRegistry, executor: ProcessExecutor) -> Self {
        Self {
            config,
            registry,
            executor,
        }
    }

    /// Dispatcher wired with the standard extractor and executor for `config`
    pub fn from_config(config: &ScriptsConfig) -> Self {
        debug!("Dispatcher::from_config: called");
        let executor = ProcessExecutor::from_config(config);
        let extractor = Arc::new(ScriptDescriptorExtractor::standard(config, executor.clone()));
        let registry = ScriptRegistry::from_config(config, extractor);
        Self::new(config.clone(), registry, executor)
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// Parse and route one command
    pub async fn handle(&self, raw_command: &str, extra_args: &[String], ctx: &ToolContext) -> ToolResult {
        debug!(%raw_command, ?extra_args, "Dispatcher::handle: called");
        let Some(command) = Command::parse(raw_command, extra_args) else {
            debug!("Dispatcher::handle: empty command");
            return ToolResult::error("Command required. Use --help for usage.");
        };

        match command.verb.as_str() {
            HELP_VERB => ToolResult::success(render_help(&self.config)),
            LIST_VERB => self.list(ctx).await,
            INFO_VERB => match command.args.first() {
                Some(name) => self.info(ctx, name).await,
                None => ToolResult::error("Script name required. Usage: --info <script_name>"),
            },
            _ => self.run(ctx, &command.verb, command.args).await,
        }
    }

    async fn list(&self, ctx: &ToolContext) -> ToolResult {
        debug!("Dispatcher::list: called");
        let scripts = self.registry.discover(ctx).await;
        let entries: Vec<ListEntry<'_>> = scripts
            .iter()
            .map(|s| ListEntry {
                name: &s.name,
                description: &s.description,
            })
            .collect();

        match serde_json::to_string_pretty(&entries) {
            Ok(json) => ToolResult::success(json),
            Err(e) => ToolResult::error(format!("Failed to render script list: {}", e)),
        }
    }

    async fn info(&self, ctx: &ToolContext, name: &str) -> ToolResult {
        debug!(%name, "Dispatcher::info: called");
        match self.registry.lookup(ctx, name).await {
            Ok(script) => ToolResult::success(script.description),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    async fn run(&self, ctx: &ToolContext, name: &str, args: Vec<String>) -> ToolResult {
        debug!(%name, ?args, "Dispatcher::run: called");
        let path = match self.registry.locate(ctx, name).await {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "Dispatcher::run: script not resolved");
                return ToolResult::error(e.to_string());
            }
        };

        let request = RunRequest::new(path, args).with_timeout(self.config.exec_timeout());
        let outcome = match &ctx.session {
            Some(session) => self.executor.run_in_session(request, session).await,
            None => self.executor.run(request).await,
        };

        match outcome {
            Ok(result) => {
                info!(script = %name, exit_code = result.exit_code, timed_out = result.timed_out, "Script finished");
                render_execution(name, result, &self.config)
            }
            Err(e @ ToolError::Spawn { .. }) => {
                warn!(script = %name, error = %e, "Script could not be started");
                ToolResult::error(e.to_string())
            }
            Err(e) => ToolResult::error(format!("Script execution failed: {}", e)),
        }
    }
}

fn render_execution(name: &str, result: ExecutionResult, config: &ScriptsConfig) -> ToolResult {
    if result.success() {
        if result.stdout.trim().is_empty() {
            return ToolResult::success(format!("Script '{}' completed successfully", name));
        }
        return ToolResult::success(result.stdout);
    }

    if !result.stderr.trim().is_empty() {
        return ToolResult::error(result.stderr);
    }

    if result.timed_out {
        let ms = config.exec_timeout_ms.unwrap_or_default();
        ToolResult::error(format!("Script '{}' timed out after {}ms", name, ms))
    } else if result.canceled {
        ToolResult::error(format!("Script '{}' was superseded by a newer request", name))
    } else {
        ToolResult::error(format!("Script '{}' failed with exit code {}", name, result.exit_code))
    }
}
