//! The value tree built during generation.
//!
//! References stay as [`RefHandle`]s until the fixup pass, so the tree can't
//! be plain JSON yet. Uniqueness checks run on this unresolved form: a
//! reference hashes and compares by namespace and arity only, never by the
//! value it will eventually get.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde_json::{Map, Value};

use crate::error::GenError;
use crate::ledger::{RefHandle, Resolutions, Resolved};

#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    /// keys in generation order
    Object(IndexMap<String, Instance>),
    Array(Vec<Instance>),
    String(String),
    Number(f64),
    DateTime(DateTime<Utc>),
    Ref(RefHandle),
}

// ----------------------------- Canonical form ----------------------------- //

impl Instance {
    /// Hash that ignores object key order.
    pub fn canonical_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash_into(&mut h);
        h.finish()
    }

    fn hash_into<H: Hasher>(&self, h: &mut H) {
        match self {
            Instance::Object(fields) => {
                0u8.hash(h);
                fields.len().hash(h);
                let mut keys: Vec<&String> = fields.keys().collect();
                keys.sort();
                for key in keys {
                    key.hash(h);
                    fields[key.as_str()].hash_into(h);
                }
            }
            Instance::Array(items) => {
                1u8.hash(h);
                items.len().hash(h);
                for item in items {
                    item.hash_into(h);
                }
            }
            Instance::String(s) => {
                2u8.hash(h);
                s.hash(h);
            }
            Instance::Number(n) => {
                3u8.hash(h);
                OrderedFloat(*n).hash(h);
            }
            Instance::DateTime(t) => {
                4u8.hash(h);
                t.timestamp().hash(h);
                t.timestamp_subsec_nanos().hash(h);
            }
            Instance::Ref(handle) => {
                5u8.hash(h);
                handle.namespace.hash(h);
                handle.arity.hash(h);
            }
        }
    }

    /// Structural equality matching [`Instance::canonical_hash`]: object key
    /// order is ignored, references with the same namespace and arity are
    /// equal.
    pub fn canonical_eq(&self, other: &Instance) -> bool {
        match (self, other) {
            (Instance::Object(a), Instance::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.canonical_eq(w)))
            }
            (Instance::Array(a), Instance::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(v, w)| v.canonical_eq(w))
            }
            (Instance::String(a), Instance::String(b)) => a == b,
            (Instance::Number(a), Instance::Number(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Instance::DateTime(a), Instance::DateTime(b)) => a == b,
            (Instance::Ref(a), Instance::Ref(b)) => {
                a.namespace == b.namespace && a.arity == b.arity
            }
            _ => false,
        }
    }
}

// --------------------------------- Output --------------------------------- //

impl Instance {
    /// Render as JSON, substituting resolved references.
    pub fn into_json(self, resolutions: &Resolutions) -> Result<Value, GenError> {
        Ok(match self {
            Instance::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (k, v) in fields {
                    map.insert(k, v.into_json(resolutions)?);
                }
                Value::Object(map)
            }
            Instance::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| v.into_json(resolutions))
                    .collect::<Result<_, _>>()?,
            ),
            Instance::String(s) => Value::String(s),
            Instance::Number(n) => number_to_json(n),
            Instance::DateTime(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Instance::Ref(handle) => match resolutions.get(handle) {
                Some(Resolved::One(v)) => Value::String(v.clone()),
                Some(Resolved::Many(vs)) => {
                    Value::Array(vs.iter().cloned().map(Value::String).collect())
                }
                None => {
                    return Err(GenError::UnresolvedReference {
                        namespace: handle.namespace,
                        slot: handle.slot,
                    });
                }
            },
        })
    }
}

/// Integral values become JSON integers.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}
