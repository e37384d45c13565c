//! Script discovery
//!
//! Every call scans the directory afresh and builds a new snapshot, so
//! concurrent callers never share or observe partially built listings.

use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::ScriptsConfig;
use crate::tools::{ToolContext, ToolError};

use super::descriptor::{ScriptDescriptor, ScriptDescriptorExtractor};

/// Scripts described at once during discovery
pub const DESCRIBE_CONCURRENCY: usize = 4;

/// Finds scripts by naming convention and describes them
#[derive(Clone)]
pub struct ScriptRegistry {
    suffix: String,
    extractor: Arc<ScriptDescriptorExtractor>,
}

impl ScriptRegistry {
    pub fn new(suffix: impl Into<String>, extractor: Arc<ScriptDescriptorExtractor>) -> Self {
        Self {
            suffix: suffix.into(),
            extractor,
        }
    }

    pub fn from_config(config: &ScriptsConfig, extractor: Arc<ScriptDescriptorExtractor>) -> Self {
        Self::new(config.suffix.clone(), extractor)
    }

    /// All scripts in the context's scripts directory, sorted by name
    ///
    /// An unreadable directory yields an empty list and a warning.
    pub async fn discover(&self, ctx: &ToolContext) -> Vec<ScriptDescriptor> {
        debug!(dir = ?ctx.scripts_dir, "ScriptRegistry::discover: called");
        let mut entries = match tokio::fs::read_dir(&ctx.scripts_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?ctx.scripts_dir, error = %e, "Cannot read scripts directory");
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = ?ctx.scripts_dir, error = %e, "Error while listing scripts directory");
                    break;
                }
            };

            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(name) = self.logical_name(&file_name) else {
                continue;
            };

            match self.resolve(ctx, &entry.path()).await {
                Ok(path) => found.push((name.to_string(), path)),
                Err(e) => warn!(file = %file_name, error = %e, "Skipping script"),
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));

        // Each undescribed script may spawn an `--info` probe
        let descriptors: Vec<ScriptDescriptor> = stream::iter(found)
            .map(|(name, path)| async move {
                let description = self.extractor.describe(&path).await;
                ScriptDescriptor {
                    name,
                    path,
                    description,
                }
            })
            .buffered(DESCRIBE_CONCURRENCY)
            .collect()
            .await;

        info!(count = descriptors.len(), dir = ?ctx.scripts_dir, "Discovered scripts");
        descriptors
    }

    /// Describe a single script by logical name
    pub async fn lookup(&self, ctx: &ToolContext, name: &str) -> Result<ScriptDescriptor, ToolError> {
        debug!(%name, "ScriptRegistry::lookup: called");
        let path = self.locate(ctx, name).await?;
        let description = self.extractor.describe(&path).await;
        Ok(ScriptDescriptor {
            name: name.to_string(),
            path,
            description,
        })
    }

    /// Resolve a logical name to an existing script path, without describing it
    pub async fn locate(&self, ctx: &ToolContext, name: &str) -> Result<std::path::PathBuf, ToolError> {
        debug!(%name, "ScriptRegistry::locate: called");
        validate_name(name)?;

        let candidate = ctx.scripts_dir.join(format!("{}{}", name, self.suffix));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            debug!(?candidate, "ScriptRegistry::locate: no such file");
            return Err(ToolError::ScriptNotFound { name: name.to_string() });
        }

        self.resolve(ctx, &candidate).await
    }

    fn logical_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name.strip_suffix(self.suffix.as_str()).filter(|stem| !stem.is_empty())
    }

    /// Contained, canonical path of a regular file
    async fn resolve(&self, ctx: &ToolContext, path: &Path) -> Result<std::path::PathBuf, ToolError> {
        let resolved = ctx.validate_path(path)?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        if !metadata.is_file() {
            return Err(ToolError::ScriptNotFound {
                name: path.display().to_string(),
            });
        }
        Ok(resolved)
    }
}

/// Logical names are single path components
fn validate_name(name: &str) -> Result<(), ToolError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');

    if invalid {
        return Err(ToolError::InvalidScriptName { name: name.to_string() });
    }
    Ok(())
}
