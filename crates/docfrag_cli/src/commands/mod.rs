//! CLI command definitions.
//!
//! Every command works against the built-in template bundle; shared setup
//! lives here.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use docfrag_templates::{register_builtin, PoolConfig, TemplatePool, TemplateSources};

pub mod render;
pub mod scan;
pub mod smoke;

/// docfrag - safe documentation fragments for custom elements
#[derive(Parser)]
#[command(name = "docfrag")]
#[command(version, about = "docfrag - safe documentation fragments for custom elements")]
#[command(long_about = r#"
docfrag renders documentation fragments for custom elements from untrusted
manifest text. Interpolated values are HTML-escaped and templates can only
call a small, fixed set of helpers.

COMMANDS:
  render   → Render a built-in template against JSON data
  scan     → Report manifest strings that look like template injection
  smoke    → Render every built-in template with hostile sample data

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Injection findings (scan --fail-on-findings)
  4 - Template error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a template to stdout
    Render(render::RenderArgs),

    /// Scan JSON manifests for template injection
    Scan(scan::ScanArgs),

    /// Run smoke tests on the built-in templates
    Smoke(smoke::SmokeArgs),
}

/// Build a pool over the built-in bundle, optionally configured from YAML.
pub(crate) fn builtin_pool(config: Option<&Path>) -> Result<TemplatePool> {
    let config = match config {
        Some(path) => PoolConfig::from_file(path)
            .with_context(|| format!("Failed to load pool config: {}", path.display()))?,
        None => PoolConfig::default(),
    };
    debug!(?config, "Using pool configuration");

    let sources = Arc::new(TemplateSources::new());
    register_builtin(&sources).context("Failed to register built-in templates")?;
    Ok(TemplatePool::with_config(sources, config))
}

/// Read and parse a JSON document.
pub(crate) fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}
