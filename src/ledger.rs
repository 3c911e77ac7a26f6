//! Identifier / reference bookkeeping per namespace.
//!
//! Every `id` node appends a value to its namespace and every `ref` node
//! appends a placeholder. Both are also recorded in a single journal, so a
//! [`Snapshot`] is just the journal length (plus the namespace count) and
//! [`Ledger::restore`] pops entries until it gets back there. Snapshots must
//! nest like the call stack: the one taken on entry to a call is restored on
//! that call's exit only.
//!
//! Placeholders stay unresolved until [`Ledger::resolve`] runs over the final
//! value pools.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;

use crate::error::{Abandon, GenError};

pub type NsId = usize;

/// How many identifiers a placeholder resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// a single string
    Single,
    /// `n` distinct strings; `Many(0)` is an empty list
    Many(usize),
}

/// Opaque handle to a placeholder, stored in the value tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefHandle {
    pub namespace: NsId,
    pub slot: usize,
    pub arity: Arity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    One(String),
    Many(Vec<String>),
}

/// `resolutions[namespace][slot]`
#[derive(Debug, Clone, Default)]
pub struct Resolutions(Vec<Vec<Resolved>>);

impl Resolutions {
    pub fn get(&self, handle: RefHandle) -> Option<&Resolved> {
        self.0.get(handle.namespace)?.get(handle.slot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    journal: usize,
    namespaces: usize,
}

#[derive(Debug, Default)]
struct Namespace {
    name: Option<Arc<str>>,
    values: Vec<String>,
    known: HashSet<String>,
    refs: Vec<Arity>,
}

impl Namespace {
    fn clear(&mut self) {
        self.name = None;
        self.values.clear();
        self.known.clear();
        self.refs.clear();
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Value(NsId),
    Ref(NsId),
}

#[derive(Debug, Default)]
pub struct Ledger {
    index: HashMap<Arc<str>, NsId>,
    spaces: Vec<Namespace>,
    journal: Vec<Entry>,
    /// forgotten namespaces, kept for their allocations
    pool: Vec<Namespace>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, namespace: &str) -> Option<&Namespace> {
        self.index.get(namespace).map(|&id| &self.spaces[id])
    }

    fn get_or_create(&mut self, namespace: &Arc<str>) -> NsId {
        if let Some(&id) = self.index.get(namespace) {
            return id;
        }
        let id = self.spaces.len();
        let mut space = self.pool.pop().unwrap_or_default();
        space.name = Some(namespace.clone());
        self.spaces.push(space);
        self.index.insert(namespace.clone(), id);
        id
    }

    /// Number of identifiers registered in `namespace` so far.
    pub fn known_count(&self, namespace: &str) -> usize {
        self.lookup(namespace).map_or(0, |space| space.values.len())
    }

    #[cfg(test)]
    pub(crate) fn contains_value(&self, namespace: &str, value: &str) -> bool {
        self.lookup(namespace).is_some_and(|space| space.known.contains(value))
    }

    /// Register an identifier. Returns `false` (and records nothing) when
    /// the namespace already has it.
    pub fn add_value(&mut self, namespace: &Arc<str>, value: String) -> bool {
        let id = self.get_or_create(namespace);
        let space = &mut self.spaces[id];
        if !space.known.insert(value.clone()) {
            return false;
        }
        space.values.push(value);
        self.journal.push(Entry::Value(id));
        true
    }

    /// Register a placeholder. Fails with an abandon-class error while the
    /// namespace has no identifiers, so fixup always has something to pick.
    pub fn add_ref(&mut self, namespace: &Arc<str>, arity: Arity) -> Result<RefHandle, Abandon> {
        let id = match self.index.get(namespace) {
            Some(&id) if !self.spaces[id].values.is_empty() => id,
            _ => return Err(Abandon::EmptyNamespace(namespace.clone())),
        };
        let space = &mut self.spaces[id];
        let slot = space.refs.len();
        space.refs.push(arity);
        self.journal.push(Entry::Ref(id));
        Ok(RefHandle { namespace: id, slot, arity })
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { journal: self.journal.len(), namespaces: self.spaces.len() }
    }

    /// Undo everything recorded after `snapshot`, forgetting namespaces that
    /// did not exist yet.
    pub fn restore(&mut self, snapshot: Snapshot) {
        while self.journal.len() > snapshot.journal {
            match self.journal.pop() {
                Some(Entry::Value(id)) => {
                    let space = &mut self.spaces[id];
                    if let Some(value) = space.values.pop() {
                        space.known.remove(&value);
                    }
                }
                Some(Entry::Ref(id)) => {
                    self.spaces[id].refs.pop();
                }
                None => break,
            }
        }
        while self.spaces.len() > snapshot.namespaces {
            let Some(mut space) = self.spaces.pop() else { break };
            if let Some(name) = space.name.as_deref() {
                self.index.remove(name);
            }
            space.clear();
            self.pool.push(space);
        }
    }

    /// Forget everything, keeping allocations for the next document.
    pub fn reset(&mut self) {
        self.restore(Snapshot { journal: 0, namespaces: 0 });
    }

    /// Resolve every placeholder against the final value pools.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Resolutions, GenError> {
        let mut out = Vec::with_capacity(self.spaces.len());
        for space in &self.spaces {
            let name = space.name.as_deref().unwrap_or_default();
            if !space.refs.is_empty() && space.values.is_empty() {
                return Err(GenError::DanglingReferences(name.to_string()));
            }
            let mut resolved = Vec::with_capacity(space.refs.len());
            for arity in &space.refs {
                resolved.push(match *arity {
                    Arity::Single => {
                        let i = rng.random_range(0..space.values.len());
                        Resolved::One(space.values[i].clone())
                    }
                    Arity::Many(n) => {
                        if n > space.values.len() {
                            return Err(GenError::ReferenceArity {
                                namespace: name.to_string(),
                                wanted: n,
                                available: space.values.len(),
                            });
                        }
                        let picked = rand::seq::index::sample(rng, space.values.len(), n);
                        Resolved::Many(picked.into_iter().map(|i| space.values[i].clone()).collect())
                    }
                });
            }
            out.push(resolved);
        }
        Ok(Resolutions(out))
    }
}
