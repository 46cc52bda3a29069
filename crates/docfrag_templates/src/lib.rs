//! # docfrag_templates
//!
//! Secure, pooled rendering of documentation fragments.
//!
//! Template bodies are bundled with the code that owns them and registered
//! by namespace in a [`TemplateSources`] registry. A [`TemplatePool`]
//! renders them by name:
//!
//! - Names containing path separators or `..` are rejected before lookup
//! - Each template is compiled once and its instances are reused across
//!   threads, one caller per instance at a time
//! - Templates run with a small fixed set of helpers (see [`capabilities`])
//!   and HTML auto-escaping of every interpolated value
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use docfrag_templates::{TemplateBundle, TemplatePool, TemplateSources};
//!
//! let sources = Arc::new(TemplateSources::new());
//! sources
//!     .register(
//!         "greetings",
//!         TemplateBundle::new().with_template("greeting", "Hello {{ name }}!"),
//!     )
//!     .unwrap();
//!
//! let pool = TemplatePool::new(Arc::clone(&sources));
//! let output = pool
//!     .render("greeting", serde_json::json!({ "name": "<b>Eve</b>" }))
//!     .unwrap();
//! assert_eq!(output, "Hello &lt;b&gt;Eve&lt;&#x2f;b&gt;!");
//! ```

pub mod bundled;
pub mod capabilities;
mod compile;
pub mod config;
pub mod element;
pub mod error;
pub mod pool;
pub mod registry;

pub use bundled::{builtin_bundle, register_builtin, render_fragment, Fragment, BUILTIN_NAMESPACE};
pub use config::{PoolConfig, UndefinedMode};
pub use element::{AttributeDoc, CssPartDoc, CssPropertyDoc, CssStateDoc, ElementDoc, EventDoc, SlotDoc};
pub use error::{CompileError, TemplateError, TemplateResult};
pub use pool::{PoolStats, TemplatePool};
pub use registry::{validate_template_name, TemplateBundle, TemplateSource, TemplateSources};
