//! JSON Schema → [`Template`].
//!
//! Every schema location becomes one type, named by its JSON pointer
//! (`#`, `#/$defs/branch`, `#/properties/notes/items`). Local `$ref`s reuse
//! the name of the location they point to, so a recursive schema turns into
//! a cyclic template without further work.
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use serde_json::Value;

use crate::pattern::{Pattern, PatternError};
use crate::template::{
    ArrayNode, DateTimeNode, Node, NumberNode, ObjectNode, OneOfNode, Property, StringNode,
    Template,
};

/// Used for `format: uri` strings that come without a pattern.
pub const URI_PATTERN: &str =
    r"(https?)://(example\.(com|org|net)|[a-zA-Z][a-zA-Z0-9]{10}\.example(/[a-zA-Z0-9.-]{1,10}){3})";

/// Window for `format: date-time` strings, `[start, end]` years.
const DATE_TIME_YEARS: (i32, i32) = (2020, 2025);

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{location}: could not determine type")]
    Untyped { location: String },

    #[error("{location}: too many types: {types:?}")]
    TooManyTypes { location: String, types: Vec<String> },

    #[error("{location}: unexpected type '{found}'")]
    UnexpectedType { location: String, found: String },

    #[error("{location}: cannot resolve $ref '{reference}'")]
    BadReference { location: String, reference: String },

    #[error("{location}: enum values must be strings")]
    NonStringEnum { location: String },

    #[error("{location}: {source}")]
    Pattern {
        location: String,
        #[source]
        source: PatternError,
    },
}

enum Kind<'s> {
    Simple(&'s str),
    OneOf,
}

struct Compiler<'s> {
    root: &'s Value,
    /// `None` while the type is being built
    types: IndexMap<String, Option<Node>>,
}

/// Compile a (self-contained) JSON Schema document.
pub fn compile(schema: &Value) -> Result<Template, SchemaError> {
    let mut compiler = Compiler { root: schema, types: IndexMap::new() };
    let root = compiler.compile("#".to_string(), schema)?;
    let types = compiler
        .types
        .into_iter()
        .filter_map(|(name, node)| Some((name, node?)))
        .collect();
    Ok(Template { root, types })
}

impl<'s> Compiler<'s> {
    /// Returns the type name for the schema at `location`.
    fn compile(&mut self, location: String, schema: &'s Value) -> Result<String, SchemaError> {
        let (kind, location, schema) = self.kind(location, schema)?;
        if self.types.contains_key(&location) {
            return Ok(location);
        }
        self.types.insert(location.clone(), None);

        let node = match kind {
            Kind::Simple("object") => Node::Object(self.object(&location, schema)?),
            Kind::Simple("array") => {
                let items = schema.get("items").ok_or_else(|| SchemaError::Untyped {
                    location: format!("{location}/items"),
                })?;
                Node::Array(ArrayNode {
                    items: self.compile(format!("{location}/items"), items)?,
                    min_items: bound(schema, "minItems"),
                    max_items: bound(schema, "maxItems"),
                    unique_items: schema.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false),
                })
            }
            Kind::OneOf => {
                let mut oneof = Vec::new();
                if let Some(alternatives) = schema.get("oneOf").and_then(Value::as_array) {
                    for (i, alternative) in alternatives.iter().enumerate() {
                        oneof.push(self.compile(format!("{location}/oneOf/{i}"), alternative)?);
                    }
                }
                Node::OneOf(OneOfNode { oneof })
            }
            Kind::Simple("string") => string(&location, schema)?,
            Kind::Simple("number" | "integer") => Node::Number(NumberNode {
                minimum: schema.get("minimum").and_then(Value::as_f64),
                maximum: schema.get("maximum").and_then(Value::as_f64),
            }),
            Kind::Simple(other) => {
                return Err(SchemaError::UnexpectedType {
                    location,
                    found: other.to_string(),
                });
            }
        };
        self.types.insert(location.clone(), Some(node));
        Ok(location)
    }

    /// Follows `$ref`s until something with a `type` or `oneOf` turns up.
    fn kind(
        &self,
        location: String,
        schema: &'s Value,
    ) -> Result<(Kind<'s>, String, &'s Value), SchemaError> {
        match schema.get("type") {
            Some(Value::String(ty)) => return Ok((Kind::Simple(ty), location, schema)),
            Some(Value::Array(types)) if types.len() == 1 => {
                if let Some(ty) = types[0].as_str() {
                    return Ok((Kind::Simple(ty), location, schema));
                }
            }
            Some(Value::Array(types)) if types.len() > 1 => {
                return Err(SchemaError::TooManyTypes {
                    location,
                    types: types.iter().map(|t| t.to_string()).collect(),
                });
            }
            _ => {}
        }
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            let target = reference
                .strip_prefix('#')
                .and_then(|pointer| self.root.pointer(pointer))
                .ok_or_else(|| SchemaError::BadReference {
                    location: location.clone(),
                    reference: reference.to_string(),
                })?;
            return self.kind(reference.to_string(), target);
        }
        if schema.get("oneOf").is_some_and(Value::is_array) {
            return Ok((Kind::OneOf, location, schema));
        }
        Err(SchemaError::Untyped { location })
    }

    fn object(&mut self, location: &str, schema: &'s Value) -> Result<ObjectNode, SchemaError> {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        // sorted so the template doesn't depend on the schema's key order
        let mut declared: Vec<(&'s String, &'s Value)> = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.iter().collect())
            .unwrap_or_default();
        declared.sort_by(|a, b| a.0.cmp(b.0));

        let mut properties = Vec::with_capacity(declared.len());
        for (name, prop) in declared {
            let child = format!("{location}/properties/{}", escape_pointer(name));
            let type_name = self.compile(child, prop)?;
            properties.push(Property {
                name: name.clone(),
                type_name,
                required: required.contains(&name.as_str()),
            });
        }
        Ok(ObjectNode {
            properties,
            min_properties: bound(schema, "minProperties"),
            max_properties: bound(schema, "maxProperties"),
        })
    }
}

fn string(location: &str, schema: &Value) -> Result<Node, SchemaError> {
    let format = schema.get("format").and_then(Value::as_str);
    if format == Some("date-time") {
        let year = |y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).single();
        return Ok(Node::DateTime(DateTimeNode {
            minimum: year(DATE_TIME_YEARS.0),
            maximum: year(DATE_TIME_YEARS.1),
        }));
    }

    let mut enum_ = Vec::new();
    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        for value in values {
            let value = value.as_str().ok_or_else(|| SchemaError::NonStringEnum {
                location: location.to_string(),
            })?;
            enum_.push(value.to_string());
        }
    }

    let source = match schema.get("pattern").and_then(Value::as_str) {
        Some(pattern) => Some(pattern),
        None if format == Some("uri") => Some(URI_PATTERN),
        None => None,
    };
    let pattern = source
        .map(Pattern::compile)
        .transpose()
        .map_err(|source| SchemaError::Pattern { location: location.to_string(), source })?;

    Ok(Node::String(StringNode {
        min_length: bound(schema, "minLength"),
        max_length: bound(schema, "maxLength"),
        enum_,
        pattern,
    }))
}

fn bound(schema: &Value, key: &str) -> Option<usize> {
    schema
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
