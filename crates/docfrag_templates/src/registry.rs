//! Template source registry.
//!
//! Each collaborator that owns templates registers one immutable
//! [`TemplateBundle`] under its namespace at startup. Template names are
//! globally unique: a bundle that reuses a name owned by another namespace
//! is rejected, so lookups never depend on registration order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};

/// Check that a template name cannot be read as a filesystem path.
pub fn validate_template_name(name: &str) -> TemplateResult<()> {
    let invalid = name.is_empty()
        || name.contains("..")
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        return Err(TemplateError::InvalidTemplateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// An immutable collection of named template bodies.
#[derive(Debug, Clone, Default)]
pub struct TemplateBundle {
    templates: BTreeMap<String, Arc<str>>,
}

impl TemplateBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template body, replacing any previous body of the same name.
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates
            .insert(name.into(), Arc::from(body.into().as_str()));
        self
    }

    /// Get a template body by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(|body| body.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn body(&self, name: &str) -> Option<Arc<str>> {
        self.templates.get(name).cloned()
    }
}

impl<N, B> FromIterator<(N, B)> for TemplateBundle
where
    N: Into<String>,
    B: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, B)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |bundle, (name, body)| bundle.with_template(name, body))
    }
}

/// A template body resolved from the registry.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// Namespace of the bundle that provides the template.
    pub namespace: String,
    pub name: String,
    pub body: Arc<str>,
    /// Registry generation the body was read at.
    pub generation: u64,
}

#[derive(Default)]
struct SourceIndex {
    bundles: HashMap<String, Arc<TemplateBundle>>,
    /// Template name to owning namespace.
    owners: HashMap<String, String>,
    generation: u64,
}

/// Registry of template bundles keyed by namespace.
///
/// Registration and lookup are safe from any number of threads. Every
/// successful registration bumps a generation counter so pooled instances
/// compiled from an older bundle can be recognized as stale.
#[derive(Default)]
pub struct TemplateSources {
    index: RwLock<SourceIndex>,
}

impl TemplateSources {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bundle` under `namespace`.
    ///
    /// Re-registering a namespace replaces its bundle. Fails without
    /// changing anything if a template name is invalid or already provided
    /// by a different namespace.
    pub fn register(&self, namespace: impl Into<String>, bundle: TemplateBundle) -> TemplateResult<()> {
        let namespace = namespace.into();

        for name in bundle.names() {
            if let Err(err) = validate_template_name(name) {
                warn!(namespace = %namespace, name_len = name.len(), "Bundle contains an invalid template name");
                return Err(err);
            }
        }

        let mut guard = self.index.write();
        let index = &mut *guard;

        for name in bundle.names() {
            if let Some(owner) = index.owners.get(name) {
                if owner != &namespace {
                    warn!(
                        template = name,
                        namespace = %namespace,
                        owner = %owner,
                        "Template name already provided by another namespace"
                    );
                    return Err(TemplateError::DuplicateTemplate {
                        name: name.to_string(),
                        namespace,
                        owner: owner.clone(),
                    });
                }
            }
        }

        if let Some(previous) = index.bundles.remove(&namespace) {
            for name in previous.names() {
                index.owners.remove(name);
            }
        }
        for name in bundle.names() {
            index.owners.insert(name.to_string(), namespace.clone());
        }

        let count = bundle.len();
        index.bundles.insert(namespace.clone(), Arc::new(bundle));
        index.generation += 1;

        debug!(
            namespace = %namespace,
            templates = count,
            generation = index.generation,
            "Registered template bundle"
        );
        Ok(())
    }

    /// Resolve a template body by name.
    pub fn lookup(&self, name: &str) -> Option<TemplateSource> {
        self.resolve(name).1
    }

    /// The current generation, with the source when `name` is registered.
    /// Misses carry the generation too.
    pub(crate) fn resolve(&self, name: &str) -> (u64, Option<TemplateSource>) {
        let index = self.index.read();
        let source = index.owners.get(name).and_then(|namespace| {
            let body = index.bundles.get(namespace)?.body(name)?;
            Some(TemplateSource {
                namespace: namespace.clone(),
                name: name.to_string(),
                body,
                generation: index.generation,
            })
        });
        (index.generation, source)
    }

    /// Current registration generation.
    pub fn generation(&self) -> u64 {
        self.index.read().generation
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.read().owners.contains_key(name)
    }

    /// Registered namespaces in sorted order.
    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.index.read().bundles.keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Every registered template name in sorted order.
    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.read().owners.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered templates across all namespaces.
    pub fn len(&self) -> usize {
        self.index.read().owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().owners.is_empty()
    }
}

impl std::fmt::Debug for TemplateSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSources")
            .field("namespaces", &self.namespaces())
            .field("generation", &self.generation())
            .finish()
    }
}
