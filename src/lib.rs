//! Random documents from a typed grammar.
//!
//! A [`Template`] (compiled from a JSON Schema by [`schema::compile`] or
//! loaded from TOML) names the node types; a [`Generator`] instantiates the
//! root type recursively, bounded by a depth budget and sized by an optional
//! [`LimitTree`], and renders the result as JSON.
pub mod error;
pub mod generator;
pub mod instance;
pub mod ledger;
pub mod limits;
pub mod path_de;
pub mod pattern;
pub mod sample;
pub mod schema;
pub mod template;

pub use error::{Abandon, GenError, LoadError, TemplateError};
pub use generator::{Generator, GeneratorOptions};
pub use limits::{LimitTree, Limits};
pub use pattern::{Pattern, PatternError};
pub use template::{Node, Template};
