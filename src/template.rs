//! The grammar the generator instantiates.
//!
//! A [`Template`] maps type names to [`Node`]s plus a root type name. Nodes
//! refer to each other only by name, so self-referential grammars are plain
//! data; termination is the generator's job (depth budget).
//!
//! On disk a template is TOML:
//!
//! ```toml
//! root = "Doc"
//!
//! [types.Doc]
//! type = "object"
//! properties = [
//!   { name = "id", type = "DocId", required = true },
//!   { name = "note", type = "Note" },
//! ]
//!
//! [types.DocId]
//! type = "string"
//! pattern = "[a-z]{3}"
//! ```
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, TemplateError};
use crate::pattern::Pattern;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub types: IndexMap<String, Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Node {
    Object(ObjectNode),
    Array(ArrayNode),
    #[serde(rename = "oneof")]
    OneOf(OneOfNode),
    String(StringNode),
    Lorem(LoremNode),
    Book(BookNode),
    Id(IdNode),
    Ref(RefNode),
    Number(NumberNode),
    DateTime(DateTimeNode),
}

/// One of an object's properties. Required properties are always generated,
/// the others compete for the extra-property quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectNode {
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, rename = "minproperties", skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<usize>,
    #[serde(default, rename = "maxproperties", skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<usize>,
}

/// Unset bounds are derived from the limits tree at generation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayNode {
    pub items: String,
    #[serde(default, rename = "minitems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, rename = "maxitems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, rename = "uniqueitems", skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneOfNode {
    #[serde(default)]
    pub oneof: Vec<String>,
}

/// Preference when generating: `enum`, then `pattern`, then a random string
/// within the length bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringNode {
    #[serde(default, rename = "minlength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, rename = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoremUnit {
    #[default]
    Words,
    Sentences,
    Paragraphs,
}

impl LoremUnit {
    fn is_words(&self) -> bool {
        *self == LoremUnit::Words
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoremNode {
    #[serde(default, rename = "minlength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, rename = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "LoremUnit::is_words")]
    pub unit: LoremUnit,
}

/// Substrings of a UTF-8 text file; lengths count chars, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookNode {
    #[serde(default, rename = "minlength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, rename = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    pub path: PathBuf,
}

/// Generates a fresh identifier and registers it in `namespace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdNode {
    pub namespace: Arc<str>,
}

/// Refers to an identifier of `namespace`, resolved after generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefNode {
    pub namespace: Arc<str>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateTimeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<DateTime<Utc>>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Node {
    /// Names of the types this node refers to.
    pub fn referenced_types(&self) -> Vec<&str> {
        match self {
            Node::Object(obj) => obj.properties.iter().map(|p| p.type_name.as_str()).collect(),
            Node::Array(arr) => vec![arr.items.as_str()],
            Node::OneOf(alt) => alt.oneof.iter().map(String::as_str).collect(),
            Node::String(_)
            | Node::Lorem(_)
            | Node::Book(_)
            | Node::Id(_)
            | Node::Ref(_)
            | Node::Number(_)
            | Node::DateTime(_) => Vec::new(),
        }
    }
}

impl ObjectNode {
    fn check_bounds(&self, owner: &str) -> Result<(), TemplateError> {
        if let Some(min) = self.min_properties {
            if self.properties.len() < min {
                return Err(TemplateError::TooFewProperties {
                    owner: owner.to_string(),
                    properties: self.properties.len(),
                    min,
                });
            }
            if let Some(max) = self.max_properties {
                if min > max {
                    return Err(TemplateError::PropertyBounds {
                        owner: owner.to_string(),
                        min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Template {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into(), types: IndexMap::new() }
    }

    /// Builder-style insert, mostly for programmatic templates and tests.
    pub fn with_type(mut self, name: impl Into<String>, node: Node) -> Self {
        self.types.insert(name.into(), node);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.types.get(name)
    }

    /// Add the types of `other`, replacing same-named ones. A non-empty root
    /// in `other` replaces ours.
    pub fn merge(&mut self, other: Template) {
        if !other.root.is_empty() {
            self.root = other.root;
        }
        for (name, node) in other.types {
            self.types.insert(name, node);
        }
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if !self.types.contains_key(&self.root) {
            return Err(TemplateError::MissingRoot(self.root.clone()));
        }
        for (name, node) in &self.types {
            match node {
                Node::Object(obj) => obj.check_bounds(name)?,
                Node::OneOf(alt) if alt.oneof.is_empty() => {
                    return Err(TemplateError::EmptyAlternation(name.clone()));
                }
                _ => {}
            }
            for missing in node.referenced_types() {
                if !self.types.contains_key(missing) {
                    return Err(TemplateError::UndefinedType {
                        owner: name.clone(),
                        missing: missing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Parse a TOML template. Object bounds are checked here, dangling type
    /// names only by [`Template::validate`] since overrides are usually
    /// partial.
    pub fn from_toml_str(src: &str) -> Result<Self, String> {
        let template: Template = crate::path_de::from_toml_with_path(src)?;
        for (name, node) in &template.types {
            if let Node::Object(obj) = node {
                obj.check_bounds(name).map_err(|error| error.to_string())?;
            }
        }
        Ok(template)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let src = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src).map_err(|message| LoadError::Syntax {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
root = "Doc"

[types.Doc]
type = "object"
minproperties = 1
properties = [
  { name = "id", type = "DocId", required = true },
  { name = "note", type = "Note" },
  { name = "refs", type = "Refs" },
]

[types.DocId]
type = "string"
pattern = "[a-z]{3}"

[types.Note]
type = "string"
minlength = 1
maxlength = 1

[types.Refs]
type = "array"
items = "Ref"
minitems = 0
uniqueitems = true

[types.Ref]
type = "ref"
namespace = "g"

[types.Gid]
type = "id"
namespace = "g"

[types.When]
type = "date-time"
minimum = "2020-01-01T00:00:00Z"

[types.Text]
type = "lorem"
unit = "sentences"

[types.Pick]
type = "oneof"
oneof = ["Note", "When"]

[types.Score]
type = "number"
minimum = 0
maximum = 10.5
"#;

    #[test]
    fn parses_every_node_kind() {
        let t = Template::from_toml_str(DOC).unwrap();
        assert_eq!(t.root, "Doc");
        t.validate().unwrap();

        let Some(Node::Object(doc)) = t.get("Doc") else { panic!("Doc is an object") };
        assert_eq!(doc.properties.len(), 3);
        assert!(doc.properties[0].required);
        assert!(!doc.properties[1].required);
        assert_eq!(doc.min_properties, Some(1));
        assert_eq!(doc.max_properties, None);

        let Some(Node::String(id)) = t.get("DocId") else { panic!("DocId is a string") };
        assert_eq!(id.pattern.as_ref().map(Pattern::as_str), Some("[a-z]{3}"));

        let Some(Node::Array(refs)) = t.get("Refs") else { panic!("Refs is an array") };
        assert!(refs.unique_items);
        assert_eq!(refs.max_items, None);

        assert!(matches!(t.get("Text"), Some(Node::Lorem(LoremNode { unit: LoremUnit::Sentences, .. }))));
        assert!(matches!(t.get("Score"), Some(Node::Number(NumberNode { minimum: Some(m), .. })) if *m == 0.0));
        assert!(matches!(t.get("When"), Some(Node::DateTime(DateTimeNode { minimum: Some(_), maximum: None }))));
    }

    #[test]
    fn toml_round_trip_keeps_structure() {
        let t = Template::from_toml_str(DOC).unwrap();
        let src = t.to_toml().unwrap();
        let back = Template::from_toml_str(&src).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn unsupported_pattern_fails_to_load() {
        let src = r#"
root = "S"
[types.S]
type = "string"
pattern = 'a\bx'
"#;
        let err = Template::from_toml_str(src).unwrap_err();
        assert!(err.contains("unsupported"), "{err}");
    }

    #[test]
    fn object_bounds_are_checked_on_load() {
        let src = r#"
root = "O"
[types.O]
type = "object"
minproperties = 2
properties = [{ name = "a", type = "S" }]
[types.S]
type = "string"
"#;
        let err = Template::from_toml_str(src).unwrap_err();
        assert!(err.contains("min properties"), "{err}");

        let src = r#"
root = "O"
[types.O]
type = "object"
minproperties = 1
maxproperties = 0
properties = [{ name = "a", type = "S" }]
"#;
        let err = Template::from_toml_str(src).unwrap_err();
        assert!(err.contains("maxproperties"), "{err}");
    }

    #[test]
    fn validate_reports_dangling_names() {
        let t = Template::new("A").with_type(
            "A",
            Node::Array(ArrayNode { items: "Missing".into(), ..ArrayNode::default() }),
        );
        assert_eq!(
            t.validate(),
            Err(TemplateError::UndefinedType { owner: "A".into(), missing: "Missing".into() })
        );
        assert_eq!(
            Template::new("Nope").validate(),
            Err(TemplateError::MissingRoot("Nope".into()))
        );
    }

    #[test]
    fn merge_overrides_types_and_root() {
        let mut base = Template::from_toml_str(DOC).unwrap();
        let overrides = Template::new("")
            .with_type("Note", Node::Id(IdNode { namespace: Arc::from("notes") }));
        base.merge(overrides);
        assert_eq!(base.root, "Doc");
        assert!(matches!(base.get("Note"), Some(Node::Id(_))));

        base.merge(Template::new("Note"));
        assert_eq!(base.root, "Note");
    }
}
