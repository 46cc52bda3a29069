//! Compiling template bodies into executable instances.
//!
//! Every instance gets an empty environment with only the restricted
//! capabilities installed, HTML auto-escaping on, and a loader that can only
//! reach other registered templates. Before a body is compiled, its parsed
//! syntax tree is walked for calls, filters and tests; any name outside the
//! capability table fails the compile.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use minijinja::machinery::ast::{CallArg, CallType, Expr, Stmt};
use minijinja::machinery::{ast, parse, WhitespaceConfig};
use minijinja::syntax::SyntaxConfig;
use minijinja::{AutoEscape, Environment, Error, ErrorKind};
use serde::Serialize;

use crate::capabilities::{self, is_capability};
use crate::config::PoolConfig;
use crate::error::CompileError;
use crate::registry::{validate_template_name, TemplateSource, TemplateSources};

/// An executable template: one compiled body in a restricted environment.
#[derive(Clone)]
pub(crate) struct CompiledTemplate {
    name: String,
    env: Environment<'static>,
}

impl CompiledTemplate {
    pub(crate) fn render<S: Serialize>(&self, data: S) -> Result<String, Error> {
        self.env.get_template(&self.name)?.render(data)
    }
}

/// Compile `source` with the capability set attached.
pub(crate) fn compile(
    source: &TemplateSource,
    sources: &Arc<TemplateSources>,
    config: &PoolConfig,
) -> Result<CompiledTemplate, CompileError> {
    check_capabilities(&source.body)?;

    let mut env = restricted_environment(sources, config);
    env.add_template_owned(source.name.clone(), source.body.to_string())?;

    Ok(CompiledTemplate {
        name: source.name.clone(),
        env,
    })
}

fn restricted_environment(sources: &Arc<TemplateSources>, config: &PoolConfig) -> Environment<'static> {
    let mut env = Environment::empty();
    capabilities::install(&mut env);
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.set_undefined_behavior(config.undefined.behavior());
    env.set_fuel(config.fuel);

    let registry = Arc::clone(sources);
    env.set_loader(move |name| load_nested(&registry, name));
    env
}

/// Resolve `{% include %}` and friends through the registry only.
fn load_nested(sources: &TemplateSources, name: &str) -> Result<Option<String>, Error> {
    if validate_template_name(name).is_err() {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "nested template name is not allowed",
        ));
    }
    let Some(source) = sources.lookup(name) else {
        return Ok(None);
    };
    check_capabilities(&source.body)
        .map_err(|err| Error::new(ErrorKind::InvalidOperation, err.to_string()))?;
    Ok(Some(source.body.to_string()))
}

/// Reject any call, filter or test whose name is not a capability.
///
/// Calls are only checked against names the template does not bind itself,
/// so macros, `caller`, `super` and `loop` stay callable. Raw blocks,
/// comments and string literals are never inspected.
pub(crate) fn check_capabilities(body: &str) -> Result<(), CompileError> {
    let scratch = Environment::empty();
    let globals = scratch
        .template_from_named_str(SCAN_NAME, body)?
        .undeclared_variables(false);
    let tree = parse(body, SCAN_NAME, SyntaxConfig::default(), WhitespaceConfig::default())?;

    let mut usage = Usage::default();
    usage.stmt(&tree);
    usage.check(&globals)
}

const SCAN_NAME: &str = "<capability-check>";

/// Helper names a template body refers to.
#[derive(Default)]
struct Usage<'a> {
    calls: BTreeSet<&'a str>,
    filters: BTreeSet<&'a str>,
    tests: BTreeSet<&'a str>,
}

impl<'a> Usage<'a> {
    fn check(&self, globals: &HashSet<String>) -> Result<(), CompileError> {
        let calls = self
            .calls
            .iter()
            .filter(|name| globals.contains(**name) && !is_capability(name));
        let filters = self.filters.iter().filter(|name| !is_capability(name));
        // No tests are installed, so every test is unknown.
        let tests = self.tests.iter();

        match calls.chain(filters).chain(tests).next() {
            Some(name) => Err(unknown(name)),
            None => Ok(()),
        }
    }

    fn stmts(&mut self, body: &[Stmt<'a>]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt<'a>) {
        match stmt {
            Stmt::Template(t) => self.stmts(&t.children),
            Stmt::EmitExpr(e) => self.expr(&e.expr),
            Stmt::ForLoop(l) => {
                self.expr(&l.iter);
                self.opt(&l.filter_expr);
                self.stmts(&l.body);
                self.stmts(&l.else_body);
            }
            Stmt::IfCond(c) => {
                self.expr(&c.expr);
                self.stmts(&c.true_body);
                self.stmts(&c.false_body);
            }
            Stmt::WithBlock(w) => {
                for (_, value) in &w.assignments {
                    self.expr(value);
                }
                self.stmts(&w.body);
            }
            Stmt::Set(s) => self.expr(&s.expr),
            Stmt::SetBlock(s) => {
                self.opt(&s.filter);
                self.stmts(&s.body);
            }
            Stmt::AutoEscape(a) => {
                self.expr(&a.enabled);
                self.stmts(&a.body);
            }
            Stmt::FilterBlock(f) => {
                self.expr(&f.filter);
                self.stmts(&f.body);
            }
            Stmt::Block(b) => self.stmts(&b.body),
            Stmt::Import(i) => self.expr(&i.expr),
            Stmt::FromImport(i) => self.expr(&i.expr),
            Stmt::Extends(e) => self.expr(&e.name),
            Stmt::Include(i) => self.expr(&i.name),
            Stmt::Macro(m) => self.macro_decl(m),
            Stmt::CallBlock(c) => {
                self.call(&c.call);
                self.macro_decl(&c.macro_decl);
            }
            Stmt::Do(d) => self.call(&d.call),
            // Raw text and loop controls.
            _ => {}
        }
    }

    fn macro_decl(&mut self, decl: &ast::Macro<'a>) {
        for default in &decl.defaults {
            self.expr(default);
        }
        self.stmts(&decl.body);
    }

    fn call(&mut self, call: &ast::Call<'a>) {
        match call.identify_call() {
            CallType::Function(name) => {
                self.calls.insert(name);
            }
            CallType::Method(receiver, _) => self.expr(receiver),
            CallType::Object(callee) => self.expr(callee),
            CallType::Block(_) => {}
        }
        self.args(&call.args);
    }

    fn args(&mut self, args: &[CallArg<'a>]) {
        for arg in args {
            match arg {
                CallArg::Pos(e) | CallArg::Kwarg(_, e) | CallArg::PosSplat(e) | CallArg::KwargSplat(e) => {
                    self.expr(e)
                }
            }
        }
    }

    fn opt(&mut self, expr: &Option<Expr<'a>>) {
        if let Some(expr) = expr {
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr<'a>) {
        match expr {
            Expr::Var(_) | Expr::Const(_) => {}
            Expr::Slice(s) => {
                self.expr(&s.expr);
                self.opt(&s.start);
                self.opt(&s.stop);
                self.opt(&s.step);
            }
            Expr::UnaryOp(u) => self.expr(&u.expr),
            Expr::BinOp(b) => {
                self.expr(&b.left);
                self.expr(&b.right);
            }
            Expr::Compare(c) => {
                self.expr(&c.expr);
                for op in &c.ops {
                    self.expr(&op.expr);
                }
            }
            Expr::IfExpr(i) => {
                self.expr(&i.test_expr);
                self.expr(&i.true_expr);
                self.opt(&i.false_expr);
            }
            Expr::Filter(f) => {
                self.filters.insert(f.name);
                self.opt(&f.expr);
                self.args(&f.args);
            }
            Expr::Test(t) => {
                self.tests.insert(t.name);
                self.expr(&t.expr);
                self.args(&t.args);
            }
            Expr::GetAttr(g) => self.expr(&g.expr),
            Expr::GetItem(g) => {
                self.expr(&g.expr);
                self.expr(&g.subscript_expr);
            }
            Expr::Call(c) => self.call(c),
            Expr::List(l) => {
                for item in &l.items {
                    self.expr(item);
                }
            }
            Expr::Map(m) => {
                for e in m.keys.iter().chain(&m.values) {
                    self.expr(e);
                }
            }
        }
    }
}

fn unknown(name: &str) -> CompileError {
    CompileError::UnknownCapability {
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TemplateBundle;

    fn source(name: &str, body: &str) -> TemplateSource {
        TemplateSource {
            namespace: "test".to_string(),
            name: name.to_string(),
            body: Arc::from(body),
            generation: 0,
        }
    }

    fn rejected(body: &str) -> Option<String> {
        match check_capabilities(body) {
            Err(CompileError::UnknownCapability { name }) => Some(name),
            _ => None,
        }
    }

    #[test]
    fn test_capability_check_accepts_known_helpers() {
        let bodies = [
            "{{ items|len }}",
            "{{ add(count, 1) }} {{ gt(a, b) }}",
            "{{ index(names, 0)|upper }}",
            "{{ names | join(\", \") }}",
            "{% for x in items %}{{ loop.index }}{% endfor %}",
            "{% if a and (b or c) %}x{% endif %}",
            "{{ item.method() }}",
            "{{ \"looks_like(a call)\" }}",
            "{# {{ read_file() }} #}",
            "{% macro card(t) %}{{ t|title }}{% endmacro %}{{ card(name) }}",
            "{% filter upper %}shout{% endfilter %}",
        ];
        for body in bodies {
            assert!(check_capabilities(body).is_ok(), "rejected {body:?}");
        }
    }

    #[test]
    fn test_capability_check_rejects_unknown_names() {
        assert_eq!(rejected("{{ read_file('/etc/passwd') }}").as_deref(), Some("read_file"));
        assert_eq!(rejected("{{ desc|safe }}").as_deref(), Some("safe"));
        assert_eq!(rejected("{% for i in range(3) %}{% endfor %}").as_deref(), Some("range"));
        assert_eq!(rejected("{% if x is defined %}{% endif %}").as_deref(), Some("defined"));
        assert_eq!(rejected("{% if x is not none %}{% endif %}").as_deref(), Some("none"));
        assert_eq!(rejected("{% filter escape %}x{% endfilter %}").as_deref(), Some("escape"));
        assert_eq!(rejected("{{ len(x) }}{{ env(\"HOME\") }}").as_deref(), Some("env"));
    }

    #[test]
    fn test_capability_check_sees_through_string_literals() {
        let bodies = [
            r#"{{ "}}" ~ read_file("/etc/passwd") }}"#,
            r##"{{ "{#" }}{{ read_file("/etc/passwd") }}{{ "#}" }}"##,
            r#"{% set x = "%}" %}{{ read_file(x) }}"#,
        ];
        for body in bodies {
            assert_eq!(rejected(body).as_deref(), Some("read_file"), "accepted {body:?}");
        }
    }

    #[test]
    fn test_capability_check_ignores_raw_blocks() {
        let body = "Use {% raw %}{{ foo() }} and {{ x|safe }}{% endraw %} literally, {{ name }}";
        assert!(check_capabilities(body).is_ok());
    }

    #[test]
    fn test_capability_check_scopes_local_callables() {
        assert!(check_capabilities("{% set upper_name = name|upper %}{{ upper_name }}").is_ok());
        assert!(check_capabilities(
            "{% macro row(x) %}{{ caller() }}{{ x }}{% endmacro %}{% call row(1) %}y{% endcall %}"
        )
        .is_ok());
        assert_eq!(rejected("{{ item() }}").as_deref(), Some("item"));
    }

    #[test]
    fn test_compile_and_render_escapes() {
        let sources = Arc::new(TemplateSources::new());
        let compiled = compile(
            &source("hello", "Hello {{ name }}!"),
            &sources,
            &PoolConfig::default(),
        )
        .unwrap();

        let output = compiled
            .render(serde_json::json!({ "name": "<i>Ada</i>" }))
            .unwrap();
        assert_eq!(output, "Hello &lt;i&gt;Ada&lt;&#x2f;i&gt;!");
    }

    #[test]
    fn test_compile_reports_syntax_errors() {
        let sources = Arc::new(TemplateSources::new());
        let result = compile(&source("broken", "{% if %}"), &sources, &PoolConfig::default());
        assert!(matches!(result, Err(CompileError::Syntax(_))));
    }

    #[test]
    fn test_compile_rejects_unknown_capability() {
        let sources = Arc::new(TemplateSources::new());
        let result = compile(
            &source("sneaky", "{{ debug() }}"),
            &sources,
            &PoolConfig::default(),
        );
        assert!(matches!(result, Err(CompileError::UnknownCapability { .. })));
    }

    #[test]
    fn test_nested_templates_resolve_through_registry() {
        let sources = Arc::new(TemplateSources::new());
        sources
            .register(
                "test",
                TemplateBundle::new()
                    .with_template("outer", "[{% include \"inner\" %}]")
                    .with_template("inner", "{{ value|upper }}")
                    .with_template("escape", "{% include \"../secret\" %}"),
            )
            .unwrap();

        let outer = sources.lookup("outer").unwrap();
        let compiled = compile(&outer, &sources, &PoolConfig::default()).unwrap();
        let output = compiled.render(serde_json::json!({ "value": "ok" })).unwrap();
        assert_eq!(output, "[OK]");

        let escape = sources.lookup("escape").unwrap();
        let compiled = compile(&escape, &sources, &PoolConfig::default()).unwrap();
        assert!(compiled.render(serde_json::json!({})).is_err());
    }
}
