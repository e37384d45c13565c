//! `--help` text
//!
//! Compiled into the binary from `templates/help.hbs` and rendered with the
//! active scripts configuration.

use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ScriptsConfig;

/// Script authoring guide template
pub const HELP_TEMPLATE: &str = include_str!("../../templates/help.hbs");

#[derive(Serialize)]
struct HelpContext {
    suffix: String,
    scripts_dir: String,
    probe_secs: String,
    search_path_var: String,
}

/// Render the help text for a scripts configuration
pub fn render_help(config: &ScriptsConfig) -> String {
    debug!("render_help: called");
    let context = HelpContext {
        suffix: config.suffix.clone(),
        scripts_dir: config.expanded_dir().display().to_string(),
        probe_secs: format_secs(config.probe_timeout_ms),
        search_path_var: config.search_path_var.clone(),
    };

    let mut hbs = Handlebars::new();
    hbs.register_escape_fn(handlebars::no_escape);

    match hbs.render_template(HELP_TEMPLATE, &context) {
        Ok(text) => text,
        Err(e) => {
            // The template is static; show it unrendered rather than nothing
            warn!(error = %e, "Failed to render help template");
            HELP_TEMPLATE.to_string()
        }
    }
}

fn format_secs(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{:.1}", ms as f64 / 1000.0)
    }
}
