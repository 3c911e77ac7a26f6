//! Recursive instantiation of a [`Template`].
//!
//! Every call to [`Run::instantiate`] spends one unit of depth, takes a
//! ledger snapshot and, if the call ends in an [`Abandon`], restores that
//! snapshot before handing the error to the caller. Callers that have an
//! alternative (array slot, oneof candidate, optional property) catch
//! `GenError::Abandon` and carry on; everything else propagates.
pub mod array;
pub mod object;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde_json::Value;

use crate::error::{Abandon, GenError};
use crate::instance::Instance;
use crate::ledger::{Arity, Ledger};
use crate::limits::{LimitCursor, LimitTree};
use crate::sample::{self, BookCache};
use crate::template::{Node, OneOfNode, StringNode, Template};

/// Default recursion budget.
pub const DEFAULT_DEPTH: usize = 25;

/// Tries per identifier before giving up on a namespace.
const IDENTIFIER_ATTEMPTS: usize = 100;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Recursion budget; hitting zero abandons the branch.
    pub depth: usize,
    /// Multiplies the limits tree lengths for arrays without `maxitems`.
    pub size_factor: f64,
    /// Generate `maxitems` items instead of a random count.
    pub force_max_size: bool,
    /// Optional properties whose name matches are treated as required.
    pub require: Option<Regex>,
    /// End of the default date-time window.
    pub now: DateTime<Utc>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            size_factor: 1.0,
            force_max_size: false,
            require: None,
            now: Utc::now(),
        }
    }
}

/// Produces documents for one template. Not shared between threads: give
/// each worker its own generator and seed.
pub struct Generator {
    template: Arc<Template>,
    limits: Arc<LimitTree>,
    options: GeneratorOptions,
    state: State,
}

struct State {
    rng: StdRng,
    ledger: Ledger,
    books: BookCache,
}

/// Borrowed view used for the duration of one `generate()` call.
struct Run<'g> {
    template: &'g Template,
    options: &'g GeneratorOptions,
    state: &'g mut State,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Generator {
    pub fn new(
        template: Arc<Template>,
        limits: Arc<LimitTree>,
        options: GeneratorOptions,
        seed: u64,
    ) -> Self {
        Self {
            template,
            limits,
            options,
            state: State {
                rng: StdRng::seed_from_u64(seed),
                ledger: Ledger::new(),
                books: BookCache::new(),
            },
        }
    }

    /// Build one document. Abandons that reach the root are returned as
    /// errors like any other failure.
    pub fn generate(&mut self) -> Result<Value, GenError> {
        self.state.ledger.reset();
        let root = self.template.root.as_str();
        tracing::debug!(root, depth = self.options.depth, "generating document");

        let mut run = Run {
            template: &self.template,
            options: &self.options,
            state: &mut self.state,
        };
        let tree = run.instantiate(root, self.limits.root(), self.options.depth)?;

        let resolutions = self.state.ledger.resolve(&mut self.state.rng)?;
        let value = tree.into_json(&resolutions)?;
        self.state.ledger.reset();
        tracing::debug!(root, "document complete");
        Ok(value)
    }
}

impl Run<'_> {
    fn instantiate(
        &mut self,
        type_name: &str,
        cursor: LimitCursor<'_>,
        depth: usize,
    ) -> Result<Instance, GenError> {
        if depth == 0 {
            return Err(Abandon::DepthExceeded.into());
        }
        let template = self.template;
        let node = template
            .get(type_name)
            .ok_or_else(|| GenError::UnknownType(type_name.to_string()))?;

        let snapshot = self.state.ledger.snapshot();
        let result = self.dispatch(type_name, node, cursor, depth - 1);
        if let Err(GenError::Abandon(cause)) = &result {
            tracing::trace!(type_name, %cause, "branch abandoned, rolling back");
            self.state.ledger.restore(snapshot);
        }
        result
    }

    fn dispatch(
        &mut self,
        type_name: &str,
        node: &Node,
        cursor: LimitCursor<'_>,
        depth: usize,
    ) -> Result<Instance, GenError> {
        let State { rng, ledger, books } = &mut *self.state;
        match node {
            Node::Object(obj) => self.object(type_name, obj, cursor, depth),
            Node::Array(arr) => self.array(type_name, arr, cursor, depth),
            Node::OneOf(alt) => self.one_of(type_name, alt, cursor, depth),
            Node::String(s) => Ok(Instance::String(string(rng, s))),
            Node::Lorem(l) => Ok(Instance::String(sample::lorem(
                rng,
                l.min_length,
                l.max_length,
                l.unit,
            ))),
            Node::Book(b) => books
                .sample(rng, &b.path, b.min_length, b.max_length)
                .map(Instance::String),
            Node::Id(id) => {
                for _ in 0..IDENTIFIER_ATTEMPTS {
                    let value = sample::identifier(rng);
                    if ledger.add_value(&id.namespace, value.clone()) {
                        return Ok(Instance::String(value));
                    }
                }
                Err(Abandon::IdentifiersExhausted(id.namespace.clone()).into())
            }
            Node::Ref(r) => Ok(Instance::Ref(ledger.add_ref(&r.namespace, Arity::Single)?)),
            Node::Number(n) => Ok(Instance::Number(sample::number(rng, n.minimum, n.maximum))),
            Node::DateTime(d) => Ok(Instance::DateTime(sample::date_time(
                rng,
                d.minimum,
                d.maximum,
                self.options.now,
            ))),
        }
    }

    fn one_of(
        &mut self,
        type_name: &str,
        node: &OneOfNode,
        cursor: LimitCursor<'_>,
        depth: usize,
    ) -> Result<Instance, GenError> {
        if node.oneof.is_empty() {
            return Err(GenError::EmptyAlternation(type_name.to_string()));
        }
        let mut candidates: Vec<&str> = node.oneof.iter().map(String::as_str).collect();
        candidates.shuffle(&mut self.state.rng);

        let mut last = None;
        for candidate in candidates {
            match self.instantiate(candidate, cursor, depth) {
                Ok(value) => return Ok(value),
                Err(GenError::Abandon(cause)) => last = Some(cause),
                Err(error) => return Err(error),
            }
        }
        // non-empty list, so at least one cause was recorded
        Err(last.unwrap_or(Abandon::DepthExceeded).into())
    }

    fn rng(&mut self) -> &mut StdRng {
        &mut self.state.rng
    }
}

/// `enum` first, then `pattern`, then a random string within the bounds.
fn string<R: Rng + ?Sized>(rng: &mut R, node: &StringNode) -> String {
    if let Some(choice) = node.enum_.choose(rng) {
        return choice.clone();
    }
    if let Some(pattern) = &node.pattern {
        return pattern.sample(rng);
    }
    sample::random_string(rng, node.min_length, node.max_length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::limits::Limits;

    fn template(src: &str) -> Arc<Template> {
        let t = Template::from_toml_str(src).unwrap();
        t.validate().unwrap();
        Arc::new(t)
    }

    fn generator(t: &Arc<Template>, seed: u64) -> Generator {
        Generator::new(t.clone(), Arc::new(LimitTree::empty()), GeneratorOptions::default(), seed)
    }

    fn strings(v: &Value) -> Vec<String> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|s| s.as_str().unwrap().to_string())
            .collect()
    }

    const PATTERNED_ID_DOC: &str = r#"
root = "Doc"
[types.Doc]
type = "object"
properties = [
  { name = "id", type = "DocId", required = true },
  { name = "note", type = "Note" },
]
[types.DocId]
type = "string"
pattern = "[a-z]{3}"
[types.Note]
type = "string"
minlength = 1
maxlength = 1
"#;

    #[test]
    fn required_pattern_and_bounded_optional() {
        let t = template(PATTERNED_ID_DOC);
        let mut saw_note = false;
        for seed in 0..40 {
            let doc = generator(&t, seed).generate().unwrap();
            let obj = doc.as_object().unwrap();
            let id = obj["id"].as_str().unwrap();
            assert_eq!(id.len(), 3);
            assert!(id.bytes().all(|b| b.is_ascii_lowercase()), "{id}");
            if let Some(note) = obj.get("note") {
                saw_note = true;
                assert_eq!(note.as_str().unwrap().chars().count(), 1);
            }
            assert!(obj.len() <= 2);
        }
        assert!(saw_note);
    }

    const ID_REF_DOC: &str = r#"
root = "Doc"
[types.Doc]
type = "object"
properties = [
  { name = "gids", type = "Gids", required = true },
  { name = "refs", type = "Refs", required = true },
]
[types.Gids]
type = "array"
items = "Gid"
minitems = 5
maxitems = 5
[types.Refs]
type = "array"
items = "GidRef"
minitems = 3
maxitems = 3
uniqueitems = true
[types.Gid]
type = "id"
namespace = "g"
[types.GidRef]
type = "ref"
namespace = "g"
"#;

    #[test]
    fn unique_references_are_distinct_identifiers() {
        let t = template(ID_REF_DOC);
        for seed in 0..20 {
            let doc = generator(&t, seed).generate().unwrap();
            let gids: HashSet<String> = strings(&doc["gids"]).into_iter().collect();
            assert_eq!(gids.len(), 5);
            let refs = strings(&doc["refs"]);
            assert_eq!(refs.len(), 3);
            assert_eq!(refs.iter().collect::<HashSet<_>>().len(), 3);
            assert!(refs.iter().all(|r| gids.contains(r)), "{refs:?} not in {gids:?}");
        }
    }

    #[test]
    fn array_that_cannot_reach_min_items_abandons() {
        let t = template(
            r#"
root = "Arr"
[types.Arr]
type = "array"
items = "Deep"
minitems = 5
maxitems = 5
[types.Deep]
type = "object"
properties = [{ name = "x", type = "Gid", required = true }]
[types.Gid]
type = "id"
namespace = "g"
"#,
        );
        let options = GeneratorOptions { depth: 2, ..GeneratorOptions::default() };
        let mut g = Generator::new(t, Arc::new(LimitTree::empty()), options, 1);
        match g.generate() {
            Err(GenError::Abandon(Abandon::NoValidValue { type_name, produced, min_items })) => {
                assert_eq!(type_name, "Arr");
                assert_eq!(produced, 0);
                assert_eq!(min_items, 5);
            }
            other => panic!("expected NoValidValue, got {other:?}"),
        }
    }

    #[test]
    fn same_seed_same_document() {
        let t = template(ID_REF_DOC);
        let a = serde_json::to_string(&generator(&t, 99).generate().unwrap()).unwrap();
        let b = serde_json::to_string(&generator(&t, 99).generate().unwrap()).unwrap();
        assert_eq!(a, b);

        let c = serde_json::to_string(&generator(&t, 100).generate().unwrap()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn self_referential_grammars_terminate() {
        let t = template(
            r#"
root = "Tree"
[types.Tree]
type = "object"
properties = [
  { name = "label", type = "Label", required = true },
  { name = "children", type = "Children" },
]
[types.Children]
type = "array"
items = "Tree"
minitems = 1
maxitems = 3
[types.Label]
type = "string"
"#,
        );
        for depth in [0, 1, 2, 5, 25] {
            let options = GeneratorOptions { depth, ..GeneratorOptions::default() };
            let mut g = Generator::new(t.clone(), Arc::new(LimitTree::empty()), options, 3);
            let result = g.generate();
            // the object takes one level, its label another
            if depth < 2 {
                assert!(matches!(result, Err(GenError::Abandon(Abandon::DepthExceeded))));
            } else {
                assert!(result.unwrap()["label"].is_string());
            }
        }

        let endless = template(
            r#"
root = "A"
[types.A]
type = "oneof"
oneof = ["B", "A"]
[types.B]
type = "array"
items = "A"
minitems = 1
"#,
        );
        let options = GeneratorOptions { depth: 8, ..GeneratorOptions::default() };
        let err = Generator::new(endless, Arc::new(LimitTree::empty()), options, 0)
            .generate()
            .unwrap_err();
        assert!(err.is_abandon(), "{err}");
    }

    #[test]
    fn property_count_within_bounds() {
        let t = template(
            r#"
root = "O"
[types.O]
type = "object"
minproperties = 2
maxproperties = 4
properties = [
  { name = "a", type = "S" }, { name = "b", type = "S" }, { name = "c", type = "S" },
  { name = "d", type = "S" }, { name = "e", type = "S" }, { name = "f", type = "S" },
]
[types.S]
type = "string"
enum = ["x"]
"#,
        );
        let mut counts = HashSet::new();
        for seed in 0..60 {
            let doc = generator(&t, seed).generate().unwrap();
            let n = doc.as_object().unwrap().len();
            assert!((2..=4).contains(&n), "{doc}");
            counts.insert(n);
        }
        assert!(counts.len() > 1);
    }

    #[test]
    fn property_order_follows_the_template() {
        let t = template(
            r#"
root = "O"
[types.O]
type = "object"
minproperties = 3
properties = [
  { name = "a", type = "S" }, { name = "b", type = "S", required = true }, { name = "c", type = "S" },
]
[types.S]
type = "string"
enum = ["x"]
"#,
        );
        let doc = generator(&t, 4).generate().unwrap();
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn unique_items_are_pairwise_distinct() {
        let t = template(
            r#"
root = "Arr"
[types.Arr]
type = "array"
items = "Letter"
minitems = 2
maxitems = 4
uniqueitems = true
[types.Letter]
type = "string"
enum = ["a", "b", "c", "d"]
"#,
        );
        for seed in 0..30 {
            let items = strings(&generator(&t, seed).generate().unwrap());
            assert!(items.len() >= 2);
            assert_eq!(items.iter().collect::<HashSet<_>>().len(), items.len(), "{items:?}");
        }
    }

    #[test]
    fn references_only_name_generated_identifiers() {
        let t = template(
            r#"
root = "Doc"
[types.Doc]
type = "object"
properties = [
  { name = "things", type = "Things", required = true },
  { name = "links", type = "Links", required = true },
]
[types.Things]
type = "array"
items = "Thing"
minitems = 1
maxitems = 6
[types.Thing]
type = "object"
properties = [{ name = "id", type = "Gid", required = true }]
[types.Links]
type = "array"
items = "Link"
minitems = 0
maxitems = 8
[types.Link]
type = "oneof"
oneof = ["GidRef", "Label"]
[types.Gid]
type = "id"
namespace = "g"
[types.GidRef]
type = "ref"
namespace = "g"
[types.Label]
type = "number"
minimum = 0
maximum = 1
"#,
        );
        for seed in 0..30 {
            let doc = generator(&t, seed).generate().unwrap();
            let ids: HashSet<&str> = doc["things"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["id"].as_str().unwrap())
                .collect();
            for link in doc["links"].as_array().unwrap() {
                if let Some(r) = link.as_str() {
                    assert!(ids.contains(r), "{r} not in {ids:?}");
                }
            }
        }
    }

    #[test]
    fn reference_before_any_identifier() {
        let optional = template(
            r#"
root = "O"
[types.O]
type = "object"
minproperties = 0
maxproperties = 1
properties = [{ name = "r", type = "R" }]
[types.R]
type = "ref"
namespace = "nowhere"
"#,
        );
        for seed in 0..10 {
            assert_eq!(generator(&optional, seed).generate().unwrap(), serde_json::json!({}));
        }

        let required = template(
            r#"
root = "R"
[types.R]
type = "ref"
namespace = "nowhere"
"#,
        );
        let err = generator(&required, 0).generate().unwrap_err();
        assert!(matches!(err, GenError::Abandon(Abandon::EmptyNamespace(ref ns)) if &**ns == "nowhere"));
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let mut t = Template::from_toml_str(
            r#"
root = "A"
[types.A]
type = "oneof"
oneof = ["Missing"]
"#,
        )
        .unwrap();
        let err = generator(&Arc::new(t.clone()), 0).generate().unwrap_err();
        assert!(matches!(err, GenError::UnknownType(ref name) if name == "Missing"));

        t.types.insert("A".into(), Node::OneOf(OneOfNode::default()));
        let err = generator(&Arc::new(t), 0).generate().unwrap_err();
        assert!(matches!(err, GenError::EmptyAlternation(_)));
    }

    #[test]
    fn insufficient_optional_properties_is_fatal() {
        let t = template(
            r#"
root = "O"
[types.O]
type = "object"
minproperties = 1
properties = [{ name = "a", type = "S" }]
[types.S]
type = "string"
"#,
        );
        let mut t = (*t).clone();
        if let Some(Node::Object(obj)) = t.types.get_mut("O") {
            // bypasses load-time validation
            obj.min_properties = Some(3);
        }
        let err = generator(&Arc::new(t), 0).generate().unwrap_err();
        assert!(matches!(err, GenError::InsufficientProperties { produced: 1, min_properties: 3, .. }));
    }

    #[test]
    fn require_option_forces_optional_properties() {
        let t = template(
            r#"
root = "O"
[types.O]
type = "object"
maxproperties = 0
properties = [{ name = "keep_me", type = "S" }, { name = "other", type = "S" }]
[types.S]
type = "string"
"#,
        );
        let options = GeneratorOptions {
            require: Some(Regex::new("^keep").unwrap()),
            ..GeneratorOptions::default()
        };
        let mut g = Generator::new(t, Arc::new(LimitTree::empty()), options, 0);
        let doc = g.generate().unwrap();
        let obj = doc.as_object().unwrap();
        assert!(obj.contains_key("keep_me"));
        assert!(!obj.contains_key("other"));
    }

    #[test]
    fn limits_drive_array_length() {
        let t = template(
            r#"
root = "Doc"
[types.Doc]
type = "object"
properties = [{ name = "notes", type = "Notes", required = true }]
[types.Notes]
type = "array"
items = "Note"
[types.Note]
type = "string"
"#,
        );
        let limits = Limits::from_json_str(r#"{ "arrays": [ { "length": 40, "paths": ["/notes"] } ] }"#)
            .unwrap();
        let tree = Arc::new(LimitTree::from_limits(&limits));

        let options = GeneratorOptions {
            size_factor: 0.1,
            force_max_size: true,
            ..GeneratorOptions::default()
        };
        let doc = Generator::new(t.clone(), tree.clone(), options, 0).generate().unwrap();
        assert_eq!(doc["notes"].as_array().unwrap().len(), 4);

        for seed in 0..20 {
            let doc = Generator::new(t.clone(), tree.clone(), GeneratorOptions::default(), seed)
                .generate()
                .unwrap();
            assert!(doc["notes"].as_array().unwrap().len() <= 40);
        }

        // no guidance: min items only
        let doc = generator(&t, 0).generate().unwrap();
        assert!(doc["notes"].as_array().unwrap().is_empty());

        let options = GeneratorOptions {
            size_factor: 1e30,
            force_max_size: true,
            ..GeneratorOptions::default()
        };
        let doc = Generator::new(t.clone(), tree.clone(), options, 0).generate().unwrap();
        assert_eq!(doc["notes"].as_array().unwrap().len(), array::MAX_SCALED_ITEMS);

        let options = GeneratorOptions {
            size_factor: f64::NAN,
            force_max_size: true,
            ..GeneratorOptions::default()
        };
        let doc = Generator::new(t, tree, options, 0).generate().unwrap();
        assert!(doc["notes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn abandoned_branch_identifiers_are_not_referenced() {
        let t = template(
            r#"
root = "Doc"
[types.Doc]
type = "object"
properties = [
  { name = "pick", type = "Pick", required = true },
  { name = "r", type = "GRef", required = true },
]
[types.Pick]
type = "oneof"
oneof = ["Bad", "Good"]
[types.Bad]
type = "object"
properties = [
  { name = "id", type = "Gid", required = true },
  { name = "dead", type = "Nowhere", required = true },
]
[types.Good]
type = "string"
[types.Gid]
type = "id"
namespace = "g"
[types.GRef]
type = "ref"
namespace = "g"
[types.Nowhere]
type = "ref"
namespace = "nowhere"
"#,
        );
        for seed in 0..20 {
            let err = generator(&t, seed).generate().unwrap_err();
            assert!(
                matches!(err, GenError::Abandon(Abandon::EmptyNamespace(ref ns)) if &**ns == "g"),
                "seed {seed}: {err}"
            );
        }
    }

    #[test]
    fn generator_is_reusable() {
        let t = template(ID_REF_DOC);
        let mut g = generator(&t, 5);
        for _ in 0..5 {
            let doc = g.generate().unwrap();
            let gids: HashSet<String> = strings(&doc["gids"]).into_iter().collect();
            assert!(strings(&doc["refs"]).iter().all(|r| gids.contains(r)));
        }
    }

    #[test]
    fn date_times_and_numbers_render() {
        let t = template(
            r#"
root = "O"
[types.O]
type = "object"
properties = [
  { name = "when", type = "When", required = true },
  { name = "n", type = "N", required = true },
]
[types.When]
type = "date-time"
minimum = "2020-01-01T00:00:00Z"
maximum = "2020-01-02T00:00:00Z"
[types.N]
type = "number"
minimum = 1
maximum = 2
"#,
        );
        let doc = generator(&t, 8).generate().unwrap();
        let when = doc["when"].as_str().unwrap();
        assert!(when.starts_with("2020-01-0"), "{when}");
        assert!(when.ends_with('Z'));
        let n = doc["n"].as_f64().unwrap();
        assert!((1.0..=2.0).contains(&n));
    }
}
