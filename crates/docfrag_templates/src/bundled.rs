//! Templates shipped with the crate.
//!
//! The bodies are embedded at build time and registered under
//! [`BUILTIN_NAMESPACE`]; nothing is read from disk at runtime.

use std::fmt;

use crate::element::ElementDoc;
use crate::error::TemplateResult;
use crate::pool::TemplatePool;
use crate::registry::{TemplateBundle, TemplateSources};

/// Namespace the built-in bundle is registered under.
pub const BUILTIN_NAMESPACE: &str = "docfrag";

/// A documentation fragment rendered from an [`ElementDoc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fragment {
    Summary,
    Attributes,
    Slots,
    Events,
    Css,
}

impl Fragment {
    pub const ALL: [Fragment; 5] = [
        Fragment::Summary,
        Fragment::Attributes,
        Fragment::Slots,
        Fragment::Events,
        Fragment::Css,
    ];

    /// Name of the built-in template for this fragment.
    pub fn template_name(self) -> &'static str {
        match self {
            Self::Summary => "element_summary",
            Self::Attributes => "element_attributes",
            Self::Slots => "element_slots",
            Self::Events => "element_events",
            Self::Css => "element_css",
        }
    }

    /// Look a fragment up by its template name.
    pub fn from_template_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.template_name() == name)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

/// The built-in element documentation templates.
pub fn builtin_bundle() -> TemplateBundle {
    TemplateBundle::new()
        .with_template(
            Fragment::Summary.template_name(),
            include_str!("../templates/element_summary.md"),
        )
        .with_template(
            Fragment::Attributes.template_name(),
            include_str!("../templates/element_attributes.md"),
        )
        .with_template(
            Fragment::Slots.template_name(),
            include_str!("../templates/element_slots.md"),
        )
        .with_template(
            Fragment::Events.template_name(),
            include_str!("../templates/element_events.md"),
        )
        .with_template(
            Fragment::Css.template_name(),
            include_str!("../templates/element_css.md"),
        )
}

/// Register the built-in bundle.
pub fn register_builtin(sources: &TemplateSources) -> TemplateResult<()> {
    sources.register(BUILTIN_NAMESPACE, builtin_bundle())
}

/// Render one fragment of an element's documentation.
pub fn render_fragment(
    pool: &TemplatePool,
    fragment: Fragment,
    element: &ElementDoc,
) -> TemplateResult<String> {
    pool.render(fragment.template_name(), element)
}
