//! # docfrag_security
//!
//! Input hygiene for manifest text before it reaches a template.
//!
//! Manifest descriptions come from third parties and may carry template
//! meta-syntax or HTML. This crate does two things with that text:
//!
//! - **Sanitize**: normalize whitespace while keeping every other character.
//!   Meta-syntax survives as literal text; it is inserted into templates as
//!   data and escaped by the rendering engine, never parsed.
//! - **Detect**: classify template-looking payloads for logging and tests.
//!   Detection never blocks rendering.
//!
//! ## Example
//!
//! ```rust
//! use docfrag_security::{looks_like_injection, sanitize, InjectionPattern};
//!
//! let raw = "A button\n\t{{.AdminToken}}  variant";
//! let clean = sanitize(raw);
//! assert_eq!(clean, "A button {{.AdminToken}} variant");
//!
//! assert!(looks_like_injection(&clean));
//! assert_eq!(
//!     docfrag_security::injection_patterns(&clean),
//!     vec![InjectionPattern::VariableAccess]
//! );
//! ```

pub mod detect;
pub mod sanitize;

pub use detect::{injection_patterns, looks_like_injection, InjectionPattern};
pub use sanitize::{sanitize, sanitize_with_report, Sanitized};
