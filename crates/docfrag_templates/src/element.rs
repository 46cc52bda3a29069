//! Documentation model for a custom element.
//!
//! These are the values the typed-item registry hands to the renderer.
//! Every string is untrusted manifest text, so each one is sanitized as it
//! is set; template syntax inside it stays literal and is escaped by the
//! engine on output.

use docfrag_security::{sanitize_with_report, InjectionPattern};
use serde::Serialize;

fn clean(text: impl AsRef<str>) -> String {
    sanitize_with_report(text.as_ref()).into_text()
}

/// Sanitized text, or `None` when nothing but whitespace was given.
fn clean_opt(text: impl AsRef<str>) -> Option<String> {
    Some(clean(text)).filter(|s| !s.is_empty())
}

/// An attribute of a custom element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeDoc {
    pub name: String,
    pub description: String,
    pub type_text: Option<String>,
    pub default: Option<String>,
}

impl AttributeDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
            type_text: None,
            default: None,
        }
    }

    pub fn type_text(mut self, type_text: impl AsRef<str>) -> Self {
        self.type_text = clean_opt(type_text);
        self
    }

    pub fn default_value(mut self, default: impl AsRef<str>) -> Self {
        self.default = clean_opt(default);
        self
    }
}

/// A slot; an empty name is the default slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotDoc {
    pub name: String,
    pub description: String,
}

impl SlotDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventDoc {
    pub name: String,
    pub description: String,
    pub detail_type: Option<String>,
}

impl EventDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
            detail_type: None,
        }
    }

    pub fn detail_type(mut self, detail_type: impl AsRef<str>) -> Self {
        self.detail_type = clean_opt(detail_type);
        self
    }
}

/// A CSS custom property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CssPropertyDoc {
    pub name: String,
    pub description: String,
    pub syntax: Option<String>,
    pub default: Option<String>,
}

impl CssPropertyDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
            syntax: None,
            default: None,
        }
    }

    pub fn syntax(mut self, syntax: impl AsRef<str>) -> Self {
        self.syntax = clean_opt(syntax);
        self
    }

    pub fn default_value(mut self, default: impl AsRef<str>) -> Self {
        self.default = clean_opt(default);
        self
    }
}

/// A CSS shadow part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CssPartDoc {
    pub name: String,
    pub description: String,
}

impl CssPartDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
        }
    }
}

/// A CSS custom state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CssStateDoc {
    pub name: String,
    pub description: String,
}

impl CssStateDoc {
    pub fn new(name: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self {
            name: clean(name),
            description: clean(description),
        }
    }
}

/// Everything documented about one custom element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ElementDoc {
    pub tag_name: String,
    /// Class name, when the manifest declares one.
    pub name: String,
    pub description: String,
    pub attributes: Vec<AttributeDoc>,
    pub slots: Vec<SlotDoc>,
    pub events: Vec<EventDoc>,
    pub css_properties: Vec<CssPropertyDoc>,
    pub css_parts: Vec<CssPartDoc>,
    pub css_states: Vec<CssStateDoc>,
}

impl ElementDoc {
    pub fn new(tag_name: impl AsRef<str>) -> Self {
        Self {
            tag_name: clean(tag_name),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl AsRef<str>) -> Self {
        self.name = clean(name);
        self
    }

    pub fn description(mut self, description: impl AsRef<str>) -> Self {
        self.description = clean(description);
        self
    }

    pub fn attribute(mut self, attribute: AttributeDoc) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn slot(mut self, slot: SlotDoc) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn event(mut self, event: EventDoc) -> Self {
        self.events.push(event);
        self
    }

    pub fn css_property(mut self, property: CssPropertyDoc) -> Self {
        self.css_properties.push(property);
        self
    }

    pub fn css_part(mut self, part: CssPartDoc) -> Self {
        self.css_parts.push(part);
        self
    }

    pub fn css_state(mut self, state: CssStateDoc) -> Self {
        self.css_states.push(state);
        self
    }

    /// Descriptions that carry template syntax, as `(field, patterns)` where
    /// `field` is `description` or `<kind>[<item name>]`.
    ///
    /// Only for monitoring: flagged text still renders, as literal data.
    pub fn suspicious_fields(&self) -> Vec<(String, Vec<InjectionPattern>)> {
        let mut fields = vec![("description".to_string(), self.description.as_str())];
        let items = self
            .attributes
            .iter()
            .map(|a| ("attributes", &a.name, &a.description))
            .chain(self.slots.iter().map(|s| ("slots", &s.name, &s.description)))
            .chain(self.events.iter().map(|e| ("events", &e.name, &e.description)))
            .chain(
                self.css_properties
                    .iter()
                    .map(|p| ("css_properties", &p.name, &p.description)),
            )
            .chain(self.css_parts.iter().map(|p| ("css_parts", &p.name, &p.description)))
            .chain(self.css_states.iter().map(|s| ("css_states", &s.name, &s.description)));
        for (kind, name, description) in items {
            fields.push((format!("{kind}[{name}]"), description.as_str()));
        }

        fields
            .into_iter()
            .filter_map(|(path, text)| {
                let patterns = docfrag_security::injection_patterns(text);
                (!patterns.is_empty()).then_some((path, patterns))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_sanitized_on_set() {
        let element = ElementDoc::new("  my-button\n")
            .name("MyButton")
            .description("A   button\n\twith {{.Secret}}")
            .attribute(AttributeDoc::new("variant", "Style\n\nname").type_text(" 'primary' | 'secondary' "));

        assert_eq!(element.tag_name, "my-button");
        assert_eq!(element.description, "A button with {{.Secret}}");
        assert_eq!(element.attributes[0].description, "Style name");
        assert_eq!(
            element.attributes[0].type_text.as_deref(),
            Some("'primary' | 'secondary'")
        );
    }

    #[test]
    fn test_blank_optional_fields_are_dropped() {
        let attr = AttributeDoc::new("open", "Whether open").default_value("  ");
        assert_eq!(attr.default, None);

        let event = EventDoc::new("close", "Closed").detail_type("\n\t");
        assert_eq!(event.detail_type, None);

        let prop = CssPropertyDoc::new("--gap", "Gap").syntax(" <length> ");
        assert_eq!(prop.syntax.as_deref(), Some("<length>"));
    }

    #[test]
    fn test_suspicious_fields() {
        let element = ElementDoc::new("x-card")
            .description("Plain text")
            .slot(SlotDoc::new("", "Content {{with .Config}}{{.APIKey}}{{end}}"))
            .event(EventDoc::new("close", "Fired on close"));

        let flagged = element.suspicious_fields();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, "slots[]");
        assert!(flagged[0].1.contains(&InjectionPattern::WithConstruct));
    }
}
