//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// Swiss Army Knife - run local helper scripts as tools
#[derive(Parser)]
#[command(
    name = "sak",
    about = "Discover, describe and run local helper scripts through a single tool",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Host the tool over newline-delimited JSON (stdio unless --socket is given)
    Serve {
        /// Listen on a Unix socket at this path instead of stdio
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Run one command, locally or through a running server
    Call {
        /// Send the command to the server listening at this socket
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,

        /// Session key; a newer call in the same session supersedes an older one
        #[arg(long, requires = "socket")]
        session: Option<String>,

        /// '--list', '--info NAME', or a script name
        #[arg(value_name = "COMMAND", allow_hyphen_values = true)]
        command: String,

        /// Arguments passed to the script
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List discovered scripts
    Scripts {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Result of checking an external executable
pub struct ToolCheck {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Check if an executable is available and get its version
    pub fn check(name: &str, version_args: &[&str]) -> Self {
        debug!(name, ?version_args, "ToolCheck::check: called");
        let result = std::process::Command::new(name).args(version_args).output();

        match result {
            Ok(output) if output.status.success() => {
                debug!(name, "ToolCheck::check: tool available");
                // Older Pythons print their version on stderr
                let mut version_str = String::from_utf8_lossy(&output.stdout).into_owned();
                version_str.push(' ');
                version_str.push_str(&String::from_utf8_lossy(&output.stderr));
                Self {
                    name: name.to_string(),
                    available: true,
                    version: Some(parse_version(&version_str)),
                }
            }
            _ => {
                debug!(name, "ToolCheck::check: tool not available");
                Self {
                    name: name.to_string(),
                    available: false,
                    version: None,
                }
            }
        }
    }
}

/// Parse version from command output (extracts first version-like string)
fn parse_version(output: &str) -> String {
    for word in output.split_whitespace() {
        let word = word.trim_start_matches('v');
        if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let version: String = word.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !version.is_empty() {
                return version;
            }
        }
    }
    "unknown".to_string()
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sak")
        .join("logs")
        .join("sak.log")
}

/// Environment report shown after the help text
pub fn generate_after_help(config: &Config) -> String {
    debug!("generate_after_help: called");
    let interpreter = ToolCheck::check(&config.scripts.interpreter, &["--version"]);
    let scripts_dir = config.scripts.expanded_dir();

    let mut help = String::new();

    help.push_str("Interpreter:\n");
    let icon = if interpreter.available { "\u{2705}" } else { "\u{274C}" };
    let version = interpreter.version.as_deref().unwrap_or("not found");
    help.push_str(&format!("  {} {:<10} {}\n", icon, interpreter.name, version));

    help.push('\n');
    help.push_str("Scripts:\n");
    let dir_icon = if scripts_dir.is_dir() { "\u{2705}" } else { "\u{274C}" };
    help.push_str(&format!("  {} {}\n", dir_icon, scripts_dir.display()));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));

    help
}

/// Output format for listings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::parse_from(["sak"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_serve_stdio() {
        let cli = Cli::parse_from(["sak", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve { socket: None })));
    }

    #[test]
    fn test_cli_parse_serve_socket() {
        let cli = Cli::parse_from(["sak", "serve", "--socket", "/tmp/x.sock"]);
        match cli.command {
            Some(Command::Serve { socket }) => assert_eq!(socket, Some(PathBuf::from("/tmp/x.sock"))),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_call_with_hyphenated_command() {
        let cli = Cli::parse_from(["sak", "call", "--list"]);
        match cli.command {
            Some(Command::Call { command, args, socket, .. }) => {
                assert_eq!(command, "--list");
                assert!(args.is_empty());
                assert!(socket.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_call_with_script_args() {
        let cli = Cli::parse_from(["sak", "call", "weather", "--city", "Paris", "-v"]);
        match cli.command {
            Some(Command::Call { command, args, .. }) => {
                assert_eq!(command, "weather");
                assert_eq!(args, vec!["--city", "Paris", "-v"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_call_session_requires_socket() {
        assert!(Cli::try_parse_from(["sak", "call", "--session", "s", "foo"]).is_err());
        assert!(Cli::try_parse_from(["sak", "call", "--socket", "/tmp/x.sock", "--session", "s", "foo"]).is_ok());
    }

    #[test]
    fn test_cli_parse_scripts_format() {
        let cli = Cli::parse_from(["sak", "scripts", "--format", "json"]);
        assert!(matches!(cli.command, Some(Command::Scripts { format: OutputFormat::Json })));

        let cli = Cli::parse_from(["sak", "scripts"]);
        assert!(matches!(cli.command, Some(Command::Scripts { format: OutputFormat::Text })));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::parse_from(["sak", "-l", "debug", "scripts", "-c", "/etc/sak.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sak.yml")));
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Python 3.12.1\n"), "3.12.1");
        assert_eq!(parse_version("tool v2.0"), "2.0");
        assert_eq!(parse_version("no version here"), "unknown");
    }

    #[test]
    fn test_tool_check_missing_executable() {
        let check = ToolCheck::check("definitely-not-installed-sak", &["--version"]);
        assert!(!check.available);
        assert!(check.version.is_none());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("plain".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("sak/logs/sak.log"));
    }
}
