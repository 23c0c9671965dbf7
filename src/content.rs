use crate::error::ContractPressError;
use crate::model::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLevel {
    Title,
    Header,
    Subheader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderNode {
    pub text: String,
    pub level: HeaderLevel,
    #[serde(default)]
    pub centered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum SignatureNode {
    /// Name, signature and date columns over three rules.
    Parent {
        name: String,
        date: String,
        name_label: String,
        signature_label: String,
        date_label: String,
    },
    /// One full-width rule for the institution's representative.
    Institution { signature_label: String },
}

/// A renderable unit of page content. Child iterations have already been
/// expanded by the time nodes reach the layout engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentNode {
    Paragraph { text: String },
    Header(HeaderNode),
    Separator,
    Signature(SignatureNode),
}

impl ContentNode {
    pub fn paragraph(text: impl Into<String>) -> Self {
        ContentNode::Paragraph { text: text.into() }
    }

    /// Copy of this node with `f` applied to every text field.
    pub fn map_text(&self, f: &impl Fn(&str) -> String) -> ContentNode {
        match self {
            ContentNode::Paragraph { text } => ContentNode::Paragraph { text: f(text) },
            ContentNode::Header(header) => ContentNode::Header(HeaderNode {
                text: f(&header.text),
                level: header.level,
                centered: header.centered,
            }),
            ContentNode::Separator => ContentNode::Separator,
            ContentNode::Signature(SignatureNode::Parent {
                name,
                date,
                name_label,
                signature_label,
                date_label,
            }) => ContentNode::Signature(SignatureNode::Parent {
                name: f(name),
                date: f(date),
                name_label: f(name_label),
                signature_label: f(signature_label),
                date_label: f(date_label),
            }),
            ContentNode::Signature(SignatureNode::Institution { signature_label }) => {
                ContentNode::Signature(SignatureNode::Institution {
                    signature_label: f(signature_label),
                })
            }
        }
    }

    /// Every text field of the node, in declaration order.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            ContentNode::Paragraph { text } => vec![text.as_str()],
            ContentNode::Header(header) => vec![header.text.as_str()],
            ContentNode::Separator => Vec::new(),
            ContentNode::Signature(SignatureNode::Parent {
                name,
                date,
                name_label,
                signature_label,
                date_label,
            }) => vec![
                name.as_str(),
                date.as_str(),
                name_label.as_str(),
                signature_label.as_str(),
                date_label.as_str(),
            ],
            ContentNode::Signature(SignatureNode::Institution { signature_label }) => {
                vec![signature_label.as_str()]
            }
        }
    }
}

/// Per-child repeating block. `start` and `end` are emitted once around the
/// repeated `body`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChildIteration {
    #[serde(default)]
    pub start: Vec<ContentNode>,
    #[serde(default)]
    pub body: Vec<ContentNode>,
    #[serde(default)]
    pub end: Vec<ContentNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateNode {
    ChildIteration { child_iteration: ChildIteration },
    Content(ContentNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePage {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTemplate {
    #[serde(default)]
    pub schema: String,
    pub language: Language,
    pub pages: Vec<TemplatePage>,
}

impl ContentTemplate {
    pub fn from_json(json: &str) -> Result<Self, ContractPressError> {
        let template: ContentTemplate = serde_json::from_str(json)?;
        Ok(template)
    }

    /// The template compiled into the `contract_content` crate.
    pub fn embedded(language: Language) -> Result<Self, ContractPressError> {
        let json = contract_content::content_json(language.code()).ok_or_else(|| {
            ContractPressError::Template(format!(
                "no embedded content for language {}",
                language.code()
            ))
        })?;
        Self::from_json(json)
    }

    pub fn page(&self, name: &str) -> Option<&TemplatePage> {
        self.pages.iter().find(|page| page.name == name)
    }

    pub fn page_names(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.name.as_str())
    }
}

/// Content templates keyed by language.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContentLibrary {
    templates: HashMap<Language, ContentTemplate>,
}

impl ContentLibrary {
    pub(crate) fn embedded() -> Result<Self, ContractPressError> {
        let mut library = Self::default();
        for language in Language::ALL {
            library
                .templates
                .insert(language, ContentTemplate::embedded(language)?);
        }
        Ok(library)
    }

    /// Replaces the template for `language`. The JSON must declare the same
    /// language it is registered under.
    pub(crate) fn insert_json(
        &mut self,
        language: Language,
        json: &str,
    ) -> Result<(), ContractPressError> {
        let template = ContentTemplate::from_json(json)?;
        if template.language != language {
            return Err(ContractPressError::Template(format!(
                "content declares language {} but was registered as {}",
                template.language.code(),
                language.code()
            )));
        }
        self.templates.insert(language, template);
        Ok(())
    }

    pub(crate) fn get(&self, language: Language) -> Result<&ContentTemplate, ContractPressError> {
        self.templates.get(&language).ok_or_else(|| {
            ContractPressError::Template(format!(
                "no content template for language {}",
                language.code()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_templates_parse_with_matching_pages() {
        let en = ContentTemplate::embedded(Language::En).expect("en");
        let es = ContentTemplate::embedded(Language::Es).expect("es");
        assert_eq!(en.language, Language::En);
        assert_eq!(es.language, Language::Es);
        assert_eq!(
            en.page_names().collect::<Vec<_>>(),
            es.page_names().collect::<Vec<_>>()
        );
        let medical = en.page("medical").expect("medical page");
        let iterations = medical
            .nodes
            .iter()
            .filter(|node| matches!(node, TemplateNode::ChildIteration { .. }))
            .count();
        assert_eq!(iterations, 1);
    }

    #[test]
    fn node_json_uses_type_and_variant_tags() {
        let json = r#"{
            "language": "en",
            "pages": [{ "name": "p", "nodes": [
                { "type": "header", "level": "title", "text": "T", "centered": true },
                { "type": "separator" },
                { "type": "signature", "variant": "institution", "signature_label": "Director" },
                { "child_iteration": { "body": [ { "type": "paragraph", "text": "{{childName}}" } ] } }
            ]}]
        }"#;
        let template = ContentTemplate::from_json(json).expect("template");
        let nodes = &template.pages[0].nodes;
        assert_eq!(nodes.len(), 4);
        assert!(matches!(
            &nodes[0],
            TemplateNode::Content(ContentNode::Header(HeaderNode { level: HeaderLevel::Title, centered: true, .. }))
        ));
        assert!(matches!(&nodes[1], TemplateNode::Content(ContentNode::Separator)));
        assert!(matches!(
            &nodes[2],
            TemplateNode::Content(ContentNode::Signature(SignatureNode::Institution { .. }))
        ));
        match &nodes[3] {
            TemplateNode::ChildIteration { child_iteration } => {
                assert!(child_iteration.start.is_empty());
                assert_eq!(child_iteration.body.len(), 1);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn malformed_or_mislabeled_content_is_a_template_error() {
        assert!(matches!(
            ContentTemplate::from_json("{ not json"),
            Err(ContractPressError::Template(_))
        ));
        let mut library = ContentLibrary::default();
        let err = library
            .insert_json(Language::Es, r#"{ "language": "en", "pages": [] }"#)
            .expect_err("language mismatch");
        assert!(matches!(err, ContractPressError::Template(_)));
        assert!(library.get(Language::Es).is_err());
    }
}
