//! Size guidance for arrays.
//!
//! A limits file lists lengths together with the paths they apply to:
//!
//! ```json
//! { "arrays": [ { "length": 100, "paths": ["/document/notes", "/vulnerabilities[]/notes"] } ] }
//! ```
//!
//! Path segments are property names. `name[]` steps into the elements of the
//! array `name`, and a parenthesised group followed by `*`, as in
//! `/product_tree(/branches[])*/product`, may repeat zero or more times. The
//! group collapses to its last segment, which becomes a self-referential node.
//!
//! The rules are folded into a [`LimitTree`] that the generator walks in
//! lock-step with the document: object properties descend by name, array
//! items by [`ITEMS`]. Walking off the tree is fine, the null cursor reports
//! a limit of 0.
use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::LoadError;

/// Segment used to step from an array to its items.
pub const ITEMS: &str = "[]";

static RECURSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(/[^)]+\)\*").expect("recursion regex is valid"));

// ------------------------------- File format ------------------------------ //

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub name: String,
    pub array: bool,
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct LimitPath(pub Vec<PathEntry>);

#[derive(Debug, Clone, Deserialize)]
pub struct LengthPaths {
    pub length: usize,
    pub paths: Vec<LimitPath>,
}

/// The parts of a limits file the generator uses. Other sections
/// (`file_size`, `strings`, `uris`) are accepted and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub arrays: Vec<LengthPaths>,
}

impl LimitPath {
    pub fn parse(path: &str) -> Self {
        let path = RECURSION_RE.replace_all(path, |caps: &regex::Captures| {
            let group = &caps[0];
            format!("{}*", &group[1..group.len() - 2])
        });
        let entries = path
            .split('/')
            .filter(|e| !e.is_empty())
            .map(|e| {
                let (e, recursive) = match e.strip_suffix('*') {
                    Some(e) => (e, true),
                    None => (e, false),
                };
                let (name, array) = match e.strip_suffix(ITEMS) {
                    Some(name) => (name, true),
                    None => (e, false),
                };
                PathEntry { name: name.to_string(), array, recursive }
            })
            .collect();
        LimitPath(entries)
    }
}

impl From<String> for LimitPath {
    fn from(path: String) -> Self {
        LimitPath::parse(&path)
    }
}

impl Limits {
    pub fn from_json_str(src: &str) -> Result<Self, String> {
        crate::path_de::from_json_with_path(src)
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let src = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&src).map_err(|message| LoadError::Syntax {
            path: path.to_path_buf(),
            message,
        })
    }
}

// -------------------------------- The tree -------------------------------- //

#[derive(Debug, Clone, Default)]
struct LimitNode {
    limit: Option<usize>,
    children: HashMap<String, usize>,
}

/// Arena of nodes, `nodes[0]` is the document root. Recursive segments make
/// this a graph, so children are indices rather than owned subtrees.
#[derive(Debug, Clone)]
pub struct LimitTree {
    nodes: Vec<LimitNode>,
}

/// Position in a [`LimitTree`]; `node == None` is the null node.
#[derive(Debug, Clone, Copy)]
pub struct LimitCursor<'t> {
    tree: &'t LimitTree,
    node: Option<usize>,
}

impl Default for LimitTree {
    fn default() -> Self {
        Self::empty()
    }
}

impl LimitTree {
    /// No guidance: every cursor reads 0.
    pub fn empty() -> Self {
        Self { nodes: vec![LimitNode::default()] }
    }

    pub fn from_rules(rules: &[LengthPaths]) -> Self {
        let mut tree = Self::empty();
        for rule in rules {
            for path in &rule.paths {
                tree.insert(0, &path.0, rule.length);
            }
        }
        tree
    }

    pub fn from_limits(limits: &Limits) -> Self {
        Self::from_rules(&limits.arrays)
    }

    pub fn root(&self) -> LimitCursor<'_> {
        LimitCursor { tree: self, node: Some(0) }
    }

    fn child(&mut self, at: usize, name: &str) -> usize {
        if let Some(&idx) = self.nodes[at].children.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(LimitNode::default());
        self.nodes[at].children.insert(name.to_string(), idx);
        idx
    }

    fn insert(&mut self, at: usize, path: &[PathEntry], length: usize) {
        let Some((entry, rest)) = path.split_first() else {
            // overlapping rules: the larger limit wins
            let node = &mut self.nodes[at];
            node.limit = Some(node.limit.map_or(length, |old| old.max(length)));
            return;
        };

        let named = self.child(at, &entry.name);
        let end = if entry.array { self.child(named, ITEMS) } else { named };

        if entry.recursive {
            self.nodes[end].children.insert(entry.name.clone(), named);
            if !rest.is_empty() {
                // zero repetitions
                self.insert(at, rest, length);
            }
        }
        self.insert(end, rest, length);
    }
}

impl<'t> LimitCursor<'t> {
    pub fn descend(self, segment: &str) -> LimitCursor<'t> {
        let node = self
            .node
            .and_then(|idx| self.tree.nodes[idx].children.get(segment).copied());
        LimitCursor { tree: self.tree, node }
    }

    pub fn limit(self) -> usize {
        self.node
            .and_then(|idx| self.tree.nodes[idx].limit)
            .unwrap_or(0)
    }

    pub fn is_null(self) -> bool {
        self.node.is_none()
    }
}
