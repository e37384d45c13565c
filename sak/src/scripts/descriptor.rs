//! Script descriptions
//!
//! A description comes from the first `DescriptionSource` that yields one.
//! The standard order is a static docstring scan, then a bounded `--info`
//! probe. When every source declines, the script's logical name is used.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScriptsConfig;

use super::process::{ProcessExecutor, RunRequest};

/// Metadata flag a script answers with its description
pub const INFO_FLAG: &str = "--info";

static DOUBLE_QUOTED_DOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"""(.*?)""""#).expect("valid docstring regex"));
static SINGLE_QUOTED_DOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)'''(.*?)'''").expect("valid docstring regex"));

/// Discovered metadata for one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub description: String,
}

/// One strategy for describing a script
#[async_trait]
pub trait DescriptionSource: Send + Sync {
    /// Source name, for logs
    fn name(&self) -> &'static str;

    /// Description for the script, or `None` to defer to the next source
    async fn describe(&self, path: &Path) -> Option<String>;
}

/// Reads the first triple-quoted block in the file
pub struct DocstringSource;

#[async_trait]
impl DescriptionSource for DocstringSource {
    fn name(&self) -> &'static str {
        "docstring"
    }

    async fn describe(&self, path: &Path) -> Option<String> {
        // Stray non-UTF-8 bytes elsewhere in the file must not hide the docstring
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                debug!(?path, error = %e, "DocstringSource::describe: unreadable");
                return None;
            }
        };
        extract_docstring(&String::from_utf8_lossy(&bytes))
    }
}

/// Earliest `"""..."""` or `'''...'''` block, trimmed, if non-empty
pub fn extract_docstring(content: &str) -> Option<String> {
    let double = DOUBLE_QUOTED_DOC.captures(content);
    let single = SINGLE_QUOTED_DOC.captures(content);

    let first = match (double, single) {
        (Some(d), Some(s)) => {
            if d.get(0)?.start() <= s.get(0)?.start() {
                d
            } else {
                s
            }
        }
        (Some(d), None) => d,
        (None, Some(s)) => s,
        (None, None) => return None,
    };

    let text = first.get(1)?.as_str().trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Asks the script itself via `--info`, under a timeout
pub struct ProbeSource {
    executor: ProcessExecutor,
    timeout: Duration,
}

impl ProbeSource {
    pub fn new(executor: ProcessExecutor, timeout: Duration) -> Self {
        Self { executor, timeout }
    }
}

#[async_trait]
impl DescriptionSource for ProbeSource {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn describe(&self, path: &Path) -> Option<String> {
        let request = RunRequest::new(path, vec![INFO_FLAG.to_string()]).with_timeout(Some(self.timeout));
        let result = match self.executor.run(request).await {
            Ok(r) => r,
            Err(e) => {
                debug!(?path, error = %e, "ProbeSource::describe: probe failed to start");
                return None;
            }
        };

        if !result.success() {
            debug!(?path, exit_code = result.exit_code, timed_out = result.timed_out, "ProbeSource::describe: probe failed");
            return None;
        }

        let text = result.stdout.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Produces a description for a script path; never fails
pub struct ScriptDescriptorExtractor {
    sources: Vec<Arc<dyn DescriptionSource>>,
    suffix: String,
}

impl ScriptDescriptorExtractor {
    /// Extractor with an explicit list of sources, tried in order
    pub fn new(sources: Vec<Arc<dyn DescriptionSource>>, suffix: impl Into<String>) -> Self {
        Self {
            sources,
            suffix: suffix.into(),
        }
    }

    /// Docstring scan, then `--info` probe
    pub fn standard(config: &ScriptsConfig, executor: ProcessExecutor) -> Self {
        debug!("ScriptDescriptorExtractor::standard: called");
        Self::new(
            vec![
                Arc::new(DocstringSource),
                Arc::new(ProbeSource::new(executor, config.probe_timeout())),
            ],
            config.suffix.clone(),
        )
    }

    pub async fn describe(&self, path: &Path) -> String {
        debug!(?path, "ScriptDescriptorExtractor::describe: called");
        for source in &self.sources {
            if let Some(description) = source.describe(path).await {
                debug!(source = source.name(), "ScriptDescriptorExtractor::describe: source matched");
                return description;
            }
        }

        debug!("ScriptDescriptorExtractor::describe: falling back to base name");
        self.base_name(path)
    }

    /// File name without the script suffix
    fn base_name(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match file_name.strip_suffix(self.suffix.as_str()) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        }
    }
}
