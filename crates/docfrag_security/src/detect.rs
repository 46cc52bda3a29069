//! Template-injection detection.
//!
//! The detector looks for the paired-delimiter grammar of template
//! languages (`{{ }}`, `{% %}`, `{# #}`), not for braces in general, so
//! JSON, CSS and code snippets in descriptions are left alone. It covers the
//! engine's own Jinja-style syntax as well as the Go-template payloads
//! (`{{.Config}}`, `{{range .Items}}`) seen in hostile manifests.
//!
//! Detection is for monitoring and tests. It never gates rendering.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("action pattern must compile"));

static STATEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{%(.*?)%\}").expect("statement pattern must compile"));

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{#(.*?)#\}").expect("comment pattern must compile"));

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("html comment pattern must compile"));

static SPACED_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\s*\{").expect("open delimiter pattern must compile"));

static SPACED_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\}\s*\}").expect("close delimiter pattern must compile"));

/// A class of template meta-syntax found in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPattern {
    /// `{{.Field}}` or `{{ field }}`
    VariableAccess,
    /// `{{$name}}`
    DollarVariable,
    /// `{{range ...}}` or `{% for ... %}`
    RangeConstruct,
    WithConstruct,
    /// `{{define}}`, `{% macro %}`, `{% set %}`
    DefineConstruct,
    /// Nested template invocation: `{{template}}`, `{% include %}` and friends.
    TemplateConstruct,
    BlockConstruct,
    /// `if`/`else`/`end` style control flow.
    ControlFlow,
    /// Any other `{% %}` statement.
    Statement,
    Comment,
}

impl InjectionPattern {
    /// Stable snake_case name, suitable for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VariableAccess => "variable_access",
            Self::DollarVariable => "dollar_variable",
            Self::RangeConstruct => "range_construct",
            Self::WithConstruct => "with_construct",
            Self::DefineConstruct => "define_construct",
            Self::TemplateConstruct => "template_construct",
            Self::BlockConstruct => "block_construct",
            Self::ControlFlow => "control_flow",
            Self::Statement => "statement",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for InjectionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `text` contains template meta-syntax.
pub fn looks_like_injection(text: &str) -> bool {
    !injection_patterns(text).is_empty()
}

/// Every distinct pattern found in `text`, in declaration order.
///
/// Both the raw text and an obfuscation-normalized copy are inspected, so
/// `{ {.X} }` and `{<!-- -->{.X}}` are caught too.
pub fn injection_patterns(text: &str) -> Vec<InjectionPattern> {
    if !text.contains('{') {
        return Vec::new();
    }

    let mut found = BTreeSet::new();
    collect(text, &mut found);

    let normalized = normalize(text);
    if normalized != text {
        collect(&normalized, &mut found);
    }

    found.into_iter().collect()
}

/// Undo the spacing and comment tricks used to hide delimiters.
fn normalize(text: &str) -> String {
    let stripped = HTML_COMMENT.replace_all(text, "");
    let opened = SPACED_OPEN.replace_all(&stripped, "{{");
    SPACED_CLOSE.replace_all(&opened, "}}").into_owned()
}

fn collect(text: &str, found: &mut BTreeSet<InjectionPattern>) {
    for caps in ACTION.captures_iter(text) {
        if let Some(pattern) = delimited_body(&caps[1]).and_then(classify_action) {
            found.insert(pattern);
        }
    }
    for caps in STATEMENT.captures_iter(text) {
        if let Some(pattern) = delimited_body(&caps[1]).and_then(classify_statement) {
            found.insert(pattern);
        }
    }
    for caps in COMMENT.captures_iter(text) {
        if delimited_body(&caps[1]).is_some() {
            found.insert(InjectionPattern::Comment);
        }
    }
}

/// Trim whitespace and whitespace-control markers; `None` for an empty pair.
fn delimited_body(raw: &str) -> Option<&str> {
    let body = raw.trim();
    let body = body.strip_prefix(['-', '+']).unwrap_or(body).trim_start();
    let body = body.strip_suffix(['-', '+']).unwrap_or(body).trim_end();
    (!body.is_empty()).then_some(body)
}

fn leading_word(body: &str) -> &str {
    let end = body
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(body.len());
    &body[..end]
}

/// Words that join expressions but never stand alone as one.
const OPERATOR_WORDS: &[&str] = &["and", "or", "not", "in", "is", "if", "else"];

fn starts_identifier(word: &str) -> bool {
    word.starts_with(|c: char| c.is_alphabetic() || c == '_')
}

/// Classify a `{{ }}` body, or `None` when it does not read as an action.
///
/// A body counts when it opens with `.`, `$`, `/*` or a keyword, or is an
/// identifier path that ends there or continues as an expression. Object
/// literals (`color: 'red'`), stray braces and bare operator words do not.
fn classify_action(body: &str) -> Option<InjectionPattern> {
    if body.starts_with("/*") {
        return Some(InjectionPattern::Comment);
    }
    if body.starts_with('$') {
        return Some(InjectionPattern::DollarVariable);
    }
    if let Some(rest) = body.strip_prefix('.') {
        let field_or_end = rest.is_empty()
            || rest.starts_with(|c: char| c.is_alphabetic() || c == '_' || c == '|' || c.is_whitespace());
        return field_or_end.then_some(InjectionPattern::VariableAccess);
    }

    let word = leading_word(body);
    if !starts_identifier(word) {
        return None;
    }
    if let Some(pattern) = classify_keyword(word) {
        return Some(pattern);
    }
    let rest = skip_path(&body[word.len()..]);
    is_expression_tail(word, rest).then_some(InjectionPattern::VariableAccess)
}

/// Skip `.field` segments following an identifier.
fn skip_path(mut rest: &str) -> &str {
    while let Some(after) = rest.strip_prefix('.') {
        let field = leading_word(after);
        if !starts_identifier(field) {
            break;
        }
        rest = &after[field.len()..];
    }
    rest
}

fn is_expression_tail(word: &str, rest: &str) -> bool {
    if rest.is_empty() {
        return !OPERATOR_WORDS.contains(&word);
    }
    if rest.starts_with(['(', '|', '[']) {
        return true;
    }

    let next = rest.trim_start();
    if next.len() == rest.len() || next.is_empty() {
        return false;
    }
    if OPERATOR_WORDS.contains(&word) || OPERATOR_WORDS.contains(&leading_word(next)) {
        return true;
    }
    next.starts_with(|c: char| c.is_ascii_digit() || ".$\"'(|[+-*/~%<>=!".contains(c))
}

fn classify_statement(body: &str) -> Option<InjectionPattern> {
    let word = leading_word(body);
    if !starts_identifier(word) {
        return None;
    }
    Some(classify_keyword(word).unwrap_or(InjectionPattern::Statement))
}

fn classify_keyword(word: &str) -> Option<InjectionPattern> {
    let pattern = match word {
        "range" | "for" => InjectionPattern::RangeConstruct,
        "with" => InjectionPattern::WithConstruct,
        "define" | "macro" | "set" => InjectionPattern::DefineConstruct,
        "template" | "include" | "import" | "extends" | "from" => {
            InjectionPattern::TemplateConstruct
        }
        "block" => InjectionPattern::BlockConstruct,
        "if" | "elif" | "else" | "break" | "continue" => InjectionPattern::ControlFlow,
        w if w.starts_with("end") => InjectionPattern::ControlFlow,
        _ => return None,
    };
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_template_payloads() {
        let payloads = [
            "{{.Config}}",
            "{{range .Items}}{{.}}{{end}}",
            "{{with .Data}}{{.Secret}}{{end}}",
            "{{template \"x\" .}}",
            "{{define \"x\"}}{{end}}",
            "{{block \"x\" .}}{{end}}",
        ];
        for payload in payloads {
            assert!(looks_like_injection(payload), "missed {payload:?}");
        }
    }

    #[test]
    fn test_ignores_ordinary_braces() {
        let benign = [
            "Normal description",
            "JavaScript: {key: value}",
            "CSS: .class { color: red; }",
            "if (x) { return true; }",
            "{\"a\": {\"b\": 1}}",
            "",
            "{{}}",
            "{{ }}",
            "<my-el style={{ color: 'red' }} />",
            "println!(\"{{}} {{{}}}\", x)",
            "Escape braces as {{ and }} in format strings",
            "{{ 42 }}",
            "Progress: {% 50 %}",
        ];
        for text in benign {
            assert!(!looks_like_injection(text), "false positive for {text:?}");
        }
    }

    #[test]
    fn test_pattern_classification() {
        assert_eq!(
            injection_patterns("{{range .Items}}{{.}}{{end}}"),
            vec![
                InjectionPattern::VariableAccess,
                InjectionPattern::RangeConstruct,
                InjectionPattern::ControlFlow,
            ]
        );
        assert_eq!(
            injection_patterns("{{$secret := .Config.Secret}}{{$secret}}"),
            vec![InjectionPattern::DollarVariable]
        );
        assert_eq!(
            injection_patterns("{{define \"malicious\"}}{{.}}{{end}}"),
            vec![
                InjectionPattern::VariableAccess,
                InjectionPattern::DefineConstruct,
                InjectionPattern::ControlFlow,
            ]
        );
    }

    #[test]
    fn test_jinja_syntax() {
        assert_eq!(
            injection_patterns("{% for s in secrets %}{{ s }}{% endfor %}"),
            vec![
                InjectionPattern::VariableAccess,
                InjectionPattern::RangeConstruct,
                InjectionPattern::ControlFlow,
            ]
        );
        assert_eq!(
            injection_patterns("{% include 'admin' %}"),
            vec![InjectionPattern::TemplateConstruct]
        );
        assert_eq!(
            injection_patterns("{# hidden #}"),
            vec![InjectionPattern::Comment]
        );
        assert_eq!(
            injection_patterns("{%- raw -%}"),
            vec![InjectionPattern::Statement]
        );
    }

    #[test]
    fn test_expression_actions() {
        let actions = [
            "{{ name }}",
            "{{ user.email }}",
            "{{ name|upper }}",
            "{{ read_file(\"/etc/passwd\") }}",
            "{{ items[0] }}",
            "{{ printf \"%s\" .Secret }}",
            "{{ not secret }}",
            "{{ a and b }}",
            "{{ count + 1 }}",
        ];
        for action in actions {
            assert_eq!(
                injection_patterns(action),
                vec![InjectionPattern::VariableAccess],
                "{action:?}"
            );
        }
    }

    #[test]
    fn test_detects_obfuscated_delimiters() {
        assert!(looks_like_injection("{ {.Secret} }"));
        assert!(looks_like_injection("{<!-- hide -->{.Secret}}"));
        assert!(looks_like_injection("{{- .Trimmed -}}"));
    }

    #[test]
    fn test_pattern_names() {
        assert_eq!(InjectionPattern::RangeConstruct.as_str(), "range_construct");
        assert_eq!(InjectionPattern::Comment.to_string(), "comment");
    }
}
