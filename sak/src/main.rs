//! Swiss Army Knife
//!
//! CLI entry point: host the tool over RPC, run a single command, or list scripts.

use std::fs;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use eyre::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use sak::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use sak::config::Config;
use sak::ipc::{RpcClient, RpcServer};
use sak::scripts::Dispatcher;
use sak::tools::builtin::TOOL_NAME;
use sak::tools::{ToolCall, ToolContext, ToolExecutor, ToolResult};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so problems go to stderr
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(scripts_dir = ?config.scripts.expanded_dir(), "sak loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Serve { socket }) => cmd_serve(&config, socket).await,
        Some(Command::Call {
            socket,
            session,
            command,
            args,
        }) => {
            let result = cmd_call(&config, socket, session, &command, args).await?;
            if result.is_error {
                eprintln!("{}", result.content);
                std::process::exit(1);
            }
            println!("{}", result.content);
            Ok(())
        }
        Some(Command::Scripts { format }) => cmd_scripts(&config, format).await,
        None => {
            debug!("main: no command specified, printing help");
            Cli::command().after_help(generate_after_help(&config)).print_help()?;
            Ok(())
        }
    }
}

/// Host the tool on stdio or a Unix socket
async fn cmd_serve(config: &Config, socket: Option<PathBuf>) -> Result<()> {
    debug!(?socket, "cmd_serve: called");
    let server = RpcServer::from_config(config);
    match socket {
        Some(path) => server.serve_socket(&path).await,
        None => server.serve_stdio().await,
    }
}

/// Run one command through the tool, in-process or via a server
async fn cmd_call(
    config: &Config,
    socket: Option<PathBuf>,
    session: Option<String>,
    command: &str,
    args: Vec<String>,
) -> Result<ToolResult> {
    debug!(%command, ?args, ?socket, "cmd_call: called");
    let input = json!({ "command": command, "args": args });

    match socket {
        Some(path) => {
            let mut client = RpcClient::with_socket_path(path);
            if let Some(timeout) = config.scripts.exec_timeout() {
                // Leave the server room to report its own timeout
                client = client.with_call_timeout(timeout * 2);
            }
            client.call_tool(TOOL_NAME, input, session).await
        }
        None => {
            let executor = ToolExecutor::standard(config);
            let ctx = ToolContext::new(config.scripts.expanded_dir());
            let call = ToolCall {
                name: TOOL_NAME.to_string(),
                input,
            };
            Ok(executor.execute(&call, &ctx).await)
        }
    }
}

/// Print discovered scripts
async fn cmd_scripts(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_scripts: called");
    let dispatcher = Dispatcher::from_config(&config.scripts);
    let ctx = ToolContext::new(config.scripts.expanded_dir());
    let scripts = dispatcher.registry().discover(&ctx).await;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&scripts).context("Failed to render scripts")?);
        }
        OutputFormat::Text => {
            if scripts.is_empty() {
                println!("No scripts found in {}", ctx.scripts_dir.display());
                return Ok(());
            }
            let width = scripts.iter().map(|s| s.name.len()).max().unwrap_or(0);
            for script in &scripts {
                let summary = script.description.lines().next().unwrap_or_default();
                println!("{:<width$}  {}", script.name, summary, width = width);
            }
        }
    }
    Ok(())
}
