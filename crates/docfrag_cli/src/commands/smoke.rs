//! Smoke command - Render the built-in templates with hostile sample data.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use docfrag_templates::{
    render_fragment, AttributeDoc, CssPartDoc, CssPropertyDoc, CssStateDoc, ElementDoc, EventDoc,
    Fragment, SlotDoc, TemplatePool,
};

use super::builtin_pool;

#[derive(Args)]
pub struct SmokeArgs {
    /// Specific template to test (tests all if not specified)
    #[arg(short, long)]
    template: Option<String>,

    /// Pool configuration file (YAML)
    #[arg(short, long, env = "DOCFRAG_CONFIG")]
    config: Option<PathBuf>,
}

pub fn execute(args: SmokeArgs) -> Result<()> {
    info!("Running template smoke tests");

    let pool = builtin_pool(args.config.as_deref())?;

    let fragments: Vec<Fragment> = match &args.template {
        Some(name) => Fragment::from_template_name(name).into_iter().collect(),
        None => Fragment::ALL.to_vec(),
    };

    if fragments.is_empty() {
        println!("⚠️  No templates found to test");
        return Ok(());
    }

    println!("🧪 Testing {} template(s)...\n", fragments.len());

    let element = sample_element();
    let mut passed = 0;
    let mut failed = 0;

    for fragment in fragments {
        print!("Testing {}... ", fragment);

        let issues = check_fragment(&pool, fragment, &element);
        if issues.is_empty() {
            println!("✅");
            passed += 1;
        } else {
            println!("❌");
            failed += 1;
            for issue in issues {
                println!("   - {}", issue);
            }
        }
    }

    println!();
    println!("Results: {} passed, {} failed", passed, failed);

    if failed > 0 {
        anyhow::bail!("{} template(s) failed the smoke test", failed);
    }

    Ok(())
}

/// Problems found rendering one fragment; empty when it passed.
fn check_fragment(pool: &TemplatePool, fragment: Fragment, element: &ElementDoc) -> Vec<String> {
    let output = match render_fragment(pool, fragment, element) {
        Ok(output) => output,
        Err(e) => return vec![format!("render failed: {e}")],
    };

    let mut issues = Vec::new();
    if output.trim().is_empty() {
        issues.push("rendered output is empty".to_string());
    }
    let lowered = output.to_ascii_lowercase();
    for tag in ["<script", "<img"] {
        if lowered.contains(tag) {
            issues.push(format!("unescaped {tag}> in rendered output"));
        }
    }
    issues
}

/// An element whose every text field carries an injection attempt.
fn sample_element() -> ElementDoc {
    ElementDoc::new("smoke-button")
        .name("SmokeButton")
        .description("A button {{.DatabasePassword}} with <script>alert('xss')</script>")
        .attribute(
            AttributeDoc::new("variant", "Style {{range .Secrets}}{{.}}{{end}}")
                .type_text("'primary' | 'secondary'")
                .default_value("'primary'"),
        )
        .slot(SlotDoc::new("", "Content {{with .Config}}{{.APIKey}}{{end}}"))
        .slot(SlotDoc::new("icon", "Icon <img src=x onerror=alert(1)>"))
        .event(
            EventDoc::new("click", "Click {{template \"../../../etc/passwd\" .}}")
                .detail_type("{ x: number }"),
        )
        .css_property(
            CssPropertyDoc::new("--button-color", "Color {% set x = 1 %}{{ x }}")
                .syntax("<color>")
                .default_value("red"),
        )
        .css_part(CssPartDoc::new("label", "Label {{block \"evil\" .}}x{{end}}"))
        .css_state(CssStateDoc::new("busy", "Busy {# hidden #} <script>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fragments_pass_smoke() {
        let pool = builtin_pool(None).unwrap();
        let element = sample_element();

        for fragment in Fragment::ALL {
            let issues = check_fragment(&pool, fragment, &element);
            assert!(issues.is_empty(), "{fragment}: {issues:?}");
        }
    }

    #[test]
    fn test_sample_element_is_hostile() {
        let flagged = sample_element().suspicious_fields();
        assert_eq!(flagged.len(), 7);
    }
}
