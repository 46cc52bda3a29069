//! Scan command - Report manifest strings that look like template injection.
//!
//! Findings are informational: flagged text still renders safely as
//! literal data. `--fail-on-findings` turns them into a failing exit code
//! for CI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use docfrag_security::{injection_patterns, InjectionPattern};

use super::read_json;

#[derive(Args)]
pub struct ScanArgs {
    /// JSON manifest, or a directory searched for *.json files
    path: PathBuf,

    /// Exit with code 3 when any string looks like template injection
    #[arg(long)]
    fail_on_findings: bool,
}

/// Raised by `scan --fail-on-findings` when something was flagged.
#[derive(Debug, Error)]
#[error("{0} manifest string(s) look like template injection")]
pub struct FindingsDetected(pub usize);

/// A flagged string: its JSON path and the constructs found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub path: String,
    pub patterns: Vec<InjectionPattern>,
}

pub fn execute(args: ScanArgs) -> Result<()> {
    info!("Scanning manifests: {}", args.path.display());

    let files = manifest_files(&args.path)?;
    if files.is_empty() {
        println!("⚠️  No JSON manifests found");
        return Ok(());
    }

    let mut total = 0;
    for file in &files {
        let manifest = read_json(file)?;
        let findings = scan_value(&manifest);
        if findings.is_empty() {
            println!("✅ {}", file.display());
            continue;
        }

        warn!(file = %file.display(), findings = findings.len(), "Possible template injection");
        println!("❌ {}", file.display());
        for finding in &findings {
            let names: Vec<&str> = finding.patterns.iter().map(|p| p.as_str()).collect();
            println!("   - {}: {}", finding.path, names.join(", "));
        }
        total += findings.len();
    }

    println!();
    println!("Results: {} file(s) scanned, {} finding(s)", files.len(), total);

    if total > 0 && args.fail_on_findings {
        return Err(FindingsDetected(total).into());
    }

    Ok(())
}

/// The file itself, or every `*.json` file below a directory, in name order.
fn manifest_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("Manifest path not found: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Collect every string in `value` that looks like injection.
pub fn scan_value(value: &Value) -> Vec<Finding> {
    let mut findings = Vec::new();
    walk(value, "$".to_string(), &mut findings);
    findings
}

fn walk(value: &Value, path: String, findings: &mut Vec<Finding>) {
    match value {
        Value::String(text) => {
            let patterns = injection_patterns(text);
            if !patterns.is_empty() {
                findings.push(Finding { path, patterns });
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, format!("{path}[{i}]"), findings);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                walk(item, format!("{path}.{key}"), findings);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn hostile_manifest() -> Value {
        json!({
            "schemaVersion": "1.0.0",
            "modules": [{
                "declarations": [{
                    "tagName": "malicious-button",
                    "description": "A button {{.DatabasePassword}} component",
                    "attributes": [
                        { "name": "variant", "description": "Plain style" },
                        { "name": "size", "description": "Size {{range .Secrets}}{{.}}{{end}}" }
                    ]
                }]
            }]
        })
    }

    #[test]
    fn test_scan_value_reports_paths() {
        let findings = scan_value(&hostile_manifest());

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].path, "$.modules[0].declarations[0].attributes[1].description");
        assert!(findings[0].patterns.contains(&InjectionPattern::RangeConstruct));
        assert_eq!(findings[1].path, "$.modules[0].declarations[0].description");
        assert_eq!(findings[1].patterns, vec![InjectionPattern::VariableAccess]);
    }

    #[test]
    fn test_scan_value_clean_manifest() {
        let manifest = json!({ "tagName": "x-card", "description": "A card with { braces }" });
        assert!(scan_value(&manifest).is_empty());
    }

    #[test]
    fn test_manifest_files_walks_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("b.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("nested/a.json"), "{}").unwrap();
        fs::write(temp_dir.path().join("notes.md"), "# notes").unwrap();

        let files = manifest_files(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "json")));
    }

    #[test]
    fn test_manifest_files_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        assert!(manifest_files(&temp_dir.path().join("missing")).is_err());
    }
}
