//! Error taxonomy.
//!
//! Generation distinguishes two classes of failure:
//! - [`Abandon`]: "this subtree failed, try a sibling alternative". Every
//!   caller that can offer an alternative (array slot, oneof candidate,
//!   optional property) matches on `GenError::Abandon` and retries.
//! - everything else is fatal and aborts the whole `generate()` call.
use std::path::PathBuf;
use std::sync::Arc;

use crate::pattern::PatternError;

/// Recoverable failures. The generator rolls back the namespace ledger to
/// the snapshot taken when the failing call started before propagating one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Abandon {
    #[error("maximum recursion depth exceeded")]
    DepthExceeded,

    #[error("no valid value for '{type_name}': {produced} of {min_items} items")]
    NoValidValue {
        type_name: String,
        produced: usize,
        min_items: usize,
    },

    /// Namespace names are shared (`Arc`) so that raising this from a hot
    /// reference node never formats or allocates.
    #[error("no identifiers yet in namespace '{0}'")]
    EmptyNamespace(Arc<str>),

    #[error("no fresh identifier found for namespace '{0}'")]
    IdentifiersExhausted(Arc<str>),
}

#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error(transparent)]
    Abandon(#[from] Abandon),

    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("oneof '{0}' has no alternatives")]
    EmptyAlternation(String),

    #[error("object '{type_name}': only {produced} of at least {min_properties} properties could be generated")]
    InsufficientProperties {
        type_name: String,
        produced: usize,
        min_properties: usize,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("cannot read source text {path:?}: {source}")]
    SourceText {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source text {0:?} is not valid UTF-8")]
    SourceTextUtf8(PathBuf),

    /// Internal invariant: a reference placeholder exists for a namespace
    /// that never received a value. The reference guard makes this
    /// unreachable; seeing it means an engine bug.
    #[error("namespace '{0}' has references but no identifiers")]
    DanglingReferences(String),

    /// Internal invariant: the value tree holds a handle the ledger no
    /// longer knows about.
    #[error("reference #{slot} in namespace #{namespace} was never resolved")]
    UnresolvedReference { namespace: usize, slot: usize },

    #[error("namespace '{namespace}': reference wants {wanted} distinct identifiers, only {available} exist")]
    ReferenceArity {
        namespace: String,
        wanted: usize,
        available: usize,
    },
}

impl GenError {
    pub fn is_abandon(&self) -> bool {
        matches!(self, GenError::Abandon(_))
    }
}

/// Structural problems in a template, caught before generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("root type '{0}' is not defined")]
    MissingRoot(String),

    #[error("type '{owner}' refers to undefined type '{missing}'")]
    UndefinedType { owner: String, missing: String },

    #[error("type '{0}': oneof without alternatives")]
    EmptyAlternation(String),

    #[error("type '{owner}': {properties} properties < {min} min properties")]
    TooFewProperties {
        owner: String,
        properties: usize,
        min: usize,
    },

    #[error("type '{owner}': minproperties {min} > maxproperties {max}")]
    PropertyBounds { owner: String, min: usize, max: usize },
}

/// Failures while loading one of the input files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}: {message}")]
    Syntax { path: PathBuf, message: String },

    #[error("{path:?}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateError,
    },
}
