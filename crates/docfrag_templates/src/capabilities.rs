//! The restricted set of helpers available inside templates.
//!
//! Templates run in an empty environment: no built-in filters, tests or
//! globals. Only the helpers listed in [`CAPABILITIES`] are installed, each
//! under the same name as both a function (`len(items)`) and a filter
//! (`items|len`). Nothing here touches the filesystem, processes, the
//! network or host objects.

use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};

/// Names of every helper a template may call.
pub const CAPABILITIES: &[&str] = &["title", "upper", "lower", "len", "index", "join", "add", "gt"];

/// Whether `name` is an installed helper.
pub fn is_capability(name: &str) -> bool {
    CAPABILITIES.contains(&name)
}

/// Install the helpers on a template environment.
pub(crate) fn install(env: &mut Environment<'_>) {
    env.add_function("title", title);
    env.add_filter("title", title);
    env.add_function("upper", upper);
    env.add_filter("upper", upper);
    env.add_function("lower", lower);
    env.add_filter("lower", lower);
    env.add_function("len", len);
    env.add_filter("len", len);
    env.add_function("index", index);
    env.add_filter("index", index);
    env.add_function("join", join);
    env.add_filter("join", join);
    env.add_function("add", add);
    env.add_filter("add", add);
    env.add_function("gt", gt);
    env.add_filter("gt", gt);
}

/// The value shapes `len` knows how to measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Sequence(usize),
    Map(usize),
    Unsupported,
}

impl Shape {
    /// Classify a template value.
    pub fn of(value: &Value) -> Self {
        match value.kind() {
            ValueKind::Seq => Self::Sequence(value.len().unwrap_or(0)),
            ValueKind::Map => Self::Map(value.len().unwrap_or(0)),
            _ => Self::Unsupported,
        }
    }

    /// Element count; zero for unsupported shapes.
    pub fn count(self) -> usize {
        match self {
            Self::Sequence(n) | Self::Map(n) => n,
            Self::Unsupported => 0,
        }
    }
}

/// Uppercase the first letter of every word and lowercase the rest.
fn title(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                result.extend(c.to_uppercase());
            } else {
                result.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            result.push(c);
            at_word_start = true;
        }
    }
    result
}

fn upper(value: &str) -> String {
    value.to_uppercase()
}

fn lower(value: &str) -> String {
    value.to_lowercase()
}

fn len(value: Value) -> usize {
    Shape::of(&value).count()
}

/// Bounds-checked sequence indexing; anything out of range yields `""`.
fn index(seq: Value, position: i64) -> Value {
    let Shape::Sequence(count) = Shape::of(&seq) else {
        return Value::from("");
    };
    match usize::try_from(position) {
        Ok(i) if i < count => seq.get_item_by_index(i).unwrap_or_else(|_| Value::from("")),
        _ => Value::from(""),
    }
}

fn join(seq: Value, separator: &str) -> Result<String, Error> {
    if !matches!(Shape::of(&seq), Shape::Sequence(_)) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "join expects a sequence",
        ));
    }
    let parts: Vec<String> = seq.try_iter()?.map(|item| item.to_string()).collect();
    Ok(parts.join(separator))
}

fn add(a: i64, b: i64) -> Result<i64, Error> {
    a.checked_add(b)
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "integer overflow in add"))
}

fn gt(a: i64, b: i64) -> bool {
    a > b
}
