//! Whitespace normalization for untrusted free text.
//!
//! Sanitizing here never deletes content. Template meta-syntax and markup
//! stay in the text as literals; the rendering engine treats the result as
//! data and escapes it on output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::detect::{injection_patterns, InjectionPattern};

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern must compile"));

/// Collapse every whitespace run into a single space and trim both ends.
///
/// Idempotent, and never fails on any input.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

/// Sanitized text together with the injection patterns it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sanitized {
    /// The normalized text.
    pub text: String,
    /// Patterns recorded for observability; empty for ordinary prose.
    pub patterns: Vec<InjectionPattern>,
}

impl Sanitized {
    /// Whether any template meta-syntax was recorded.
    pub fn is_suspicious(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Consume the report and keep only the text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Sanitize `text` and record any template meta-syntax found in it.
///
/// The text itself is never logged, only the pattern names.
pub fn sanitize_with_report(text: &str) -> Sanitized {
    let text = sanitize(text);
    let patterns = injection_patterns(&text);

    if !patterns.is_empty() {
        let names: Vec<&str> = patterns.iter().map(|p| p.as_str()).collect();
        debug!(patterns = ?names, len = text.len(), "Template syntax kept as literal text");
    }

    Sanitized { text, patterns }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  a\n\n b\t\tc \r\n"), "a b c");
        assert_eq!(sanitize("single"), "single");
    }

    #[test]
    fn test_sanitize_empty_and_blank() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" \n\t "), "");
    }

    #[test]
    fn test_sanitize_keeps_meta_syntax() {
        let raw = "Button {{range .Secrets}}{{.}}{{end}}\n<script>x</script>";
        assert_eq!(
            sanitize(raw),
            "Button {{range .Secrets}}{{.}}{{end}} <script>x</script>"
        );
    }

    #[test]
    fn test_sanitize_unicode_whitespace() {
        assert_eq!(sanitize("a\u{00a0}\u{2003}b\u{0085}"), "a b");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            "",
            "   ",
            "plain",
            " lead and trail ",
            "{{ .Config }}\n\n{% for x in y %}",
            "\u{0}\u{1}binary\u{7f}\u{fffd}  garbage",
            "tabs\tand\nnewlines\r\nmixed",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
            assert!(!once.contains('\n') && !once.contains('\t'));
        }
    }

    #[test]
    fn test_sanitize_with_report() {
        let report = sanitize_with_report("Click {{template \"x\" .}}\n injection");
        assert_eq!(report.text, "Click {{template \"x\" .}} injection");
        assert!(report.is_suspicious());
        assert_eq!(report.patterns, vec![InjectionPattern::TemplateConstruct]);

        let plain = sanitize_with_report("Just words");
        assert!(!plain.is_suspicious());
        assert_eq!(plain.into_text(), "Just words");
    }
}
