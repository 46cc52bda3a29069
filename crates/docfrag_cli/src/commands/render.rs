//! Render command - Render one template to stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::{builtin_pool, read_json};

#[derive(Args)]
pub struct RenderArgs {
    /// Template name (e.g. element_summary)
    template: String,

    /// JSON file with the data to render against
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Pool configuration file (YAML)
    #[arg(short, long, env = "DOCFRAG_CONFIG")]
    config: Option<PathBuf>,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    // The name is untrusted input; it is validated by the pool before use.
    info!(name_len = args.template.len(), "Rendering template");

    let pool = builtin_pool(args.config.as_deref())?;
    let data = match &args.data {
        Some(path) => read_json(path)?,
        None => serde_json::Value::Object(serde_json::Map::new()),
    };

    let output = pool
        .render(&args.template, &data)
        .context("Failed to render template")?;

    if output.ends_with('\n') {
        print!("{output}");
    } else {
        println!("{output}");
    }
    Ok(())
}
