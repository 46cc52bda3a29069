//! Error types for template registration and rendering.

use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors surfaced to callers of the registry and the pool.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The requested name contains a path separator, a parent-directory
    /// sequence or a control character. The raw name is kept for the caller
    /// but deliberately left out of the message.
    #[error("Invalid template name: path separators, '..' and control characters are not allowed")]
    InvalidTemplateName { name: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to render template {name}: {source}")]
    RenderExecution {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Template {name} in namespace {namespace} is already provided by namespace {owner}")]
    DuplicateTemplate {
        name: String,
        namespace: String,
        owner: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    /// The template name this error refers to, if any.
    pub fn template_name(&self) -> Option<&str> {
        match self {
            Self::InvalidTemplateName { name }
            | Self::TemplateNotFound(name)
            | Self::RenderExecution { name, .. }
            | Self::DuplicateTemplate { name, .. } => Some(name),
            Self::Config(_) | Self::Io(_) => None,
        }
    }
}

/// Why a template body could not be turned into an executable instance.
///
/// Callers of [`TemplatePool::render`](crate::TemplatePool::render) only
/// ever see this as [`TemplateError::TemplateNotFound`].
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("call to unknown capability `{name}`")]
    UnknownCapability { name: String },

    #[error(transparent)]
    Syntax(#[from] minijinja::Error),
}
