//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Script discovery and execution
    pub scripts: ScriptsConfig,

    /// RPC server settings
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::implicit_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, so logging can be set up before the full load
    ///
    /// Any failure here is silent; the full load reports it properly.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        #[derive(Deserialize)]
        struct LogLevelOnly {
            #[serde(rename = "log-level")]
            log_level: Option<String>,
        }

        let path = match config_path {
            Some(p) => p.clone(),
            None => Self::implicit_paths().into_iter().find(|p| p.exists())?,
        };

        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    /// Project-local `.sak.yml`, then `~/.config/sak/sak.yml`
    fn implicit_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".sak.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sak").join("sak.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where scripts live and how they are run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Directory scanned for scripts (`~/` is expanded)
    pub dir: PathBuf,

    /// File name suffix marking a runnable script
    pub suffix: String,

    /// Interpreter executable, resolved through PATH when bare
    pub interpreter: String,

    /// Environment variable that receives the scripts directory as a search path entry
    #[serde(rename = "search-path-var")]
    pub search_path_var: String,

    /// Extra environment variables for every spawned script
    pub env: BTreeMap<String, String>,

    /// Wall-clock budget for the `--info` probe
    #[serde(rename = "probe-timeout-ms")]
    pub probe_timeout_ms: u64,

    /// Optional wall-clock budget for script execution
    #[serde(rename = "exec-timeout-ms")]
    pub exec_timeout_ms: Option<u64>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/sak/scripts on Linux)
        let dir = dirs::data_dir()
            .map(|d| d.join("sak").join("scripts"))
            .unwrap_or_else(|| PathBuf::from("scripts"));

        Self {
            dir,
            suffix: ".sak.py".to_string(),
            interpreter: "python".to_string(),
            search_path_var: "PYTHONPATH".to_string(),
            env: BTreeMap::new(),
            probe_timeout_ms: 2000,
            exec_timeout_ms: None,
        }
    }
}

impl ScriptsConfig {
    /// Scripts directory with `~/` resolved
    pub fn expanded_dir(&self) -> PathBuf {
        debug!(dir = ?self.dir, "ScriptsConfig::expanded_dir: called");
        expand_home(&self.dir)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_ms.map(Duration::from_millis)
    }
}

/// RPC server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket path used by `serve --socket` and `call --socket`
    pub socket: PathBuf,

    /// Longest accepted request line, in bytes
    #[serde(rename = "max-message-bytes")]
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: crate::ipc::get_socket_path(),
            max_message_bytes: 64 * 1024,
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map(|home| home.join(rest)).unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scripts.suffix, ".sak.py");
        assert_eq!(config.scripts.interpreter, "python");
        assert_eq!(config.scripts.probe_timeout_ms, 2000);
        assert!(config.scripts.exec_timeout_ms.is_none());
        assert_eq!(config.server.max_message_bytes, 65536);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

scripts:
  dir: /opt/scripts
  suffix: .tool.py
  interpreter: python3
  search-path-var: MYPATH
  env:
    API_URL: http://localhost
  probe-timeout-ms: 500
  exec-timeout-ms: 60000

server:
  socket: /run/sak.sock
  max-message-bytes: 1024
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scripts.dir, PathBuf::from("/opt/scripts"));
        assert_eq!(config.scripts.suffix, ".tool.py");
        assert_eq!(config.scripts.interpreter, "python3");
        assert_eq!(config.scripts.search_path_var, "MYPATH");
        assert_eq!(config.scripts.env.get("API_URL").map(String::as_str), Some("http://localhost"));
        assert_eq!(config.scripts.probe_timeout(), Duration::from_millis(500));
        assert_eq!(config.scripts.exec_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.server.socket, PathBuf::from("/run/sak.sock"));
        assert_eq!(config.server.max_message_bytes, 1024);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
scripts:
  interpreter: pypy
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.scripts.interpreter, "pypy");

        // Defaults for unspecified
        assert_eq!(config.scripts.suffix, ".sak.py");
        assert_eq!(config.scripts.search_path_var, "PYTHONPATH");
        assert_eq!(config.server.max_message_bytes, 65536);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sak.yml");
        fs::write(&path, "log-level: WARN\nscripts:\n  dir: /srv/scripts\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scripts.dir, PathBuf::from("/srv/scripts"));
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");

        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }

    #[test]
    fn test_expanded_dir_resolves_home() {
        let scripts = ScriptsConfig {
            dir: PathBuf::from("~/scripts"),
            ..Default::default()
        };

        if let Some(home) = dirs::home_dir() {
            assert_eq!(scripts.expanded_dir(), home.join("scripts"));
        }

        let absolute = ScriptsConfig {
            dir: PathBuf::from("/abs/scripts"),
            ..Default::default()
        };
        assert_eq!(absolute.expanded_dir(), PathBuf::from("/abs/scripts"));
    }
}
