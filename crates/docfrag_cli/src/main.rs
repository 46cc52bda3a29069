//! docfrag CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Injection findings (`scan --fail-on-findings`)
//! - 4: Template error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docfrag_templates::TemplateError;

mod commands;

use commands::scan::FindingsDetected;
use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const FINDINGS: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Render(args) => commands::render::execute(args),
        Commands::Scan(args) => commands::scan::execute(args),
        Commands::Smoke(args) => commands::smoke::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Log to stderr so rendered output on stdout stays clean.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "docfrag=debug" } else { "docfrag=info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<FindingsDetected>().is_some() {
            return ExitCodes::FINDINGS;
        }
        if let Some(err) = cause.downcast_ref::<TemplateError>() {
            return match err {
                TemplateError::InvalidTemplateName { .. } | TemplateError::TemplateNotFound(_) => {
                    ExitCodes::INVALID_ARGS
                }
                _ => ExitCodes::TEMPLATE_ERROR,
            };
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ExitCodes::INVALID_ARGS;
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_template_errors() {
        let not_found = anyhow::Error::new(TemplateError::TemplateNotFound("x".into()));
        assert_eq!(categorize_error(&not_found), ExitCodes::INVALID_ARGS);

        let invalid = anyhow::Error::new(TemplateError::InvalidTemplateName {
            name: "../x".into(),
        })
        .context("Failed to render template");
        assert_eq!(categorize_error(&invalid), ExitCodes::INVALID_ARGS);
    }

    #[test]
    fn test_categorize_findings_and_other() {
        let findings = anyhow::Error::new(FindingsDetected(2));
        assert_eq!(categorize_error(&findings), ExitCodes::FINDINGS);

        let other = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
