use std::collections::HashMap;

use rand::Rng;

use super::Run;
use crate::error::{Abandon, GenError};
use crate::instance::Instance;
use crate::ledger::Arity;
use crate::limits::{ITEMS, LimitCursor};
use crate::template::{ArrayNode, Node};

/// Tries per array slot before the slot is dropped.
const SLOT_ATTEMPTS: usize = 10;

/// Ceiling for lengths derived from the limits tree and size factor.
pub const MAX_SCALED_ITEMS: usize = 10_000;

impl Run<'_> {
    pub(super) fn array(
        &mut self,
        type_name: &str,
        node: &ArrayNode,
        cursor: LimitCursor<'_>,
        depth: usize,
    ) -> Result<Instance, GenError> {
        let (min, max) = self.item_bounds(node, cursor);

        // Unique references are drawn all at once from the identifiers that
        // already exist, there may not be enough of them for one per slot.
        let template = self.template;
        if node.unique_items {
            if let Some(Node::Ref(r)) = template.get(&node.items) {
                let known = self.state.ledger.known_count(&r.namespace);
                if known > 0 && known >= min {
                    let hi = known.min(max);
                    let n = if self.options.force_max_size {
                        hi
                    } else {
                        self.rng().random_range(min..=hi)
                    };
                    let handle = self.state.ledger.add_ref(&r.namespace, Arity::Many(n))?;
                    return Ok(Instance::Ref(handle));
                }
            }
        }

        let len = if self.options.force_max_size {
            max
        } else {
            self.rng().random_range(min..=max)
        };
        let item_cursor = cursor.descend(ITEMS);
        let mut items: Vec<Instance> = Vec::new();
        // canonical hash -> indices into `items`
        let mut seen: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut last_abandon = None;

        for _ in 0..len {
            for _ in 0..SLOT_ATTEMPTS {
                let snapshot = self.state.ledger.snapshot();
                let item = match self.instantiate(&node.items, item_cursor, depth) {
                    Ok(item) => item,
                    Err(GenError::Abandon(cause)) => {
                        last_abandon = Some(cause);
                        continue;
                    }
                    Err(error) => return Err(error),
                };
                if node.unique_items {
                    let bucket = seen.entry(item.canonical_hash()).or_default();
                    if bucket.iter().any(|&i| items[i].canonical_eq(&item)) {
                        // the duplicate's identifiers must not leak
                        self.state.ledger.restore(snapshot);
                        continue;
                    }
                    bucket.push(items.len());
                }
                items.push(item);
                break;
            }
        }

        if items.len() < min {
            if let Some(cause) = &last_abandon {
                tracing::trace!(type_name, %cause, "array items abandoned");
            }
            return Err(Abandon::NoValidValue {
                type_name: type_name.to_string(),
                produced: items.len(),
                min_items: min,
            }
            .into());
        }
        Ok(Instance::Array(items))
    }

    /// `(min, max)` with `max >= min`. A missing maximum comes from the
    /// limits tree scaled by the size factor, capped at [`MAX_SCALED_ITEMS`].
    fn item_bounds(&self, node: &ArrayNode, cursor: LimitCursor<'_>) -> (usize, usize) {
        let min = node.min_items.unwrap_or(0);
        let max = match node.max_items {
            Some(max) => max,
            None => scaled_len(cursor.limit(), self.options.size_factor),
        };
        (min, max.max(min))
    }
}

fn scaled_len(limit: usize, size_factor: f64) -> usize {
    let scaled = limit as f64 * size_factor;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    (scaled as usize).min(MAX_SCALED_ITEMS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_lengths_are_bounded() {
        assert_eq!(scaled_len(40, 0.5), 20);
        assert_eq!(scaled_len(40, 1e30), MAX_SCALED_ITEMS);
        assert_eq!(scaled_len(usize::MAX, 1.0), MAX_SCALED_ITEMS);
        assert_eq!(scaled_len(40, f64::NAN), 0);
        assert_eq!(scaled_len(40, f64::INFINITY), 0);
        assert_eq!(scaled_len(40, -2.0), 0);
    }
}
