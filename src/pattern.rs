//! Random strings that match a regular expression.
//!
//! A pattern is parsed into the `regex-syntax` HIR, checked against the set
//! of constructs the sampler can reproduce, and then walked to emit a match:
//! - alternation picks one branch uniformly
//! - a class picks one code point, weighted by range size
//! - `?` keeps its sub-pattern half of the time
//! - repetitions pick a count in `[min, max]`; open ranges get `max = min + 10`
//!
//! Known limitation: `^`/`$` (and `\A`/`\z`) are accepted but not enforced.
//! `a^b` has no match at all, yet samples as `"ab"`; `a*^b` matches only
//! `"b"` but may sample as `"ab"`. Callers that need exact matches should
//! avoid anchors that are not at the very start or end.
use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use rand::Rng;
use regex_syntax::hir::{Class, Dot, Hir, HirKind, Look, Repetition};

/// Extra repetitions allowed when a quantifier has no upper bound.
const UNBOUNDED_EXTRA: u32 = 10;

/// Upper bound for `*` and `+`.
const STAR_PLUS_MAX: u32 = 10;

/// `.` is sampled from printable ASCII instead of all of Unicode.
const ANY_CHAR_RANGE: (u32, u32) = (' ' as u32, '~' as u32);

static ANY_CHAR_NOT_NL: Lazy<Hir> = Lazy::new(|| Hir::dot(Dot::AnyCharExceptLF));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("invalid pattern {pattern:?}: {message}")]
    Syntax { pattern: String, message: String },

    #[error("pattern {pattern:?}: unsupported regexp operations: {}", .ops.join(", "))]
    Unsupported { pattern: String, ops: Vec<String> },

    #[error("pattern {0:?}: character class without valid matches")]
    EmptyClass(String),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    source: String,
    hir: Hir,
}

impl Pattern {
    /// Parse `source` and make sure the sampler supports every construct in it.
    pub fn compile(source: &str) -> Result<Self, PatternError> {
        let hir = regex_syntax::ParserBuilder::new()
            .build()
            .parse(source)
            .map_err(|error| PatternError::Syntax {
                pattern: source.to_string(),
                message: error.to_string(),
            })?;

        let mut unsupported = BTreeSet::new();
        if !check_node(&hir, &mut unsupported) {
            return Err(PatternError::EmptyClass(source.to_string()));
        }
        if !unsupported.is_empty() {
            return Err(PatternError::Unsupported {
                pattern: source.to_string(),
                ops: unsupported.into_iter().collect(),
            });
        }

        Ok(Self { source: source.to_string(), hir })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Generate a random string matching the pattern (modulo anchors, see
    /// module docs).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let mut sampler = Sampler { rng, buf: String::new() };
        sampler.node(&self.hir);
        sampler.buf
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for Pattern {
    type Error = PatternError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Pattern::compile(&source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

// ------------------------------ Support check ----------------------------- //

/// Collect unsupported constructs into `unsupported`. Returns `false` as soon
/// as a class that cannot match anything is found.
fn check_node(hir: &Hir, unsupported: &mut BTreeSet<String>) -> bool {
    match hir.kind() {
        HirKind::Empty => true,
        HirKind::Literal(lit) => {
            if std::str::from_utf8(&lit.0).is_err() {
                unsupported.insert("non-UTF-8 literal".to_string());
            }
            true
        }
        HirKind::Class(Class::Unicode(class)) => !class.ranges().is_empty(),
        HirKind::Class(Class::Bytes(class)) => {
            if class.ranges().iter().any(|r| !r.end().is_ascii()) {
                unsupported.insert("non-ASCII byte class".to_string());
            }
            !class.ranges().is_empty()
        }
        HirKind::Look(Look::Start | Look::End) => true,
        HirKind::Look(look) => {
            unsupported.insert(format!("{look:?}"));
            true
        }
        HirKind::Repetition(rep) => check_node(&rep.sub, unsupported),
        HirKind::Capture(cap) => check_node(&cap.sub, unsupported),
        HirKind::Concat(subs) | HirKind::Alternation(subs) => {
            subs.iter().all(|sub| check_node(sub, unsupported))
        }
    }
}

// -------------------------------- Sampling -------------------------------- //

struct Sampler<'r, R: ?Sized> {
    rng: &'r mut R,
    buf: String,
}

impl<R: Rng + ?Sized> Sampler<'_, R> {
    fn node(&mut self, hir: &Hir) {
        match hir.kind() {
            // anchors are not enforced
            HirKind::Empty | HirKind::Look(_) => {}
            HirKind::Literal(lit) => self.buf.push_str(&String::from_utf8_lossy(&lit.0)),
            HirKind::Class(_) if hir == &*ANY_CHAR_NOT_NL => {
                let c = choose_code_point(self.rng, &[ANY_CHAR_RANGE]);
                self.buf.push(c);
            }
            HirKind::Class(Class::Unicode(class)) => {
                let ranges: Vec<(u32, u32)> = class
                    .ranges()
                    .iter()
                    .map(|r| (r.start() as u32, r.end() as u32))
                    .collect();
                let c = choose_code_point(self.rng, &ranges);
                self.buf.push(c);
            }
            HirKind::Class(Class::Bytes(class)) => {
                let ranges: Vec<(u32, u32)> = class
                    .ranges()
                    .iter()
                    .map(|r| (u32::from(r.start()), u32::from(r.end())))
                    .collect();
                let c = choose_code_point(self.rng, &ranges);
                self.buf.push(c);
            }
            HirKind::Repetition(rep) => self.repetition(rep),
            HirKind::Capture(cap) => self.node(&cap.sub),
            HirKind::Concat(subs) => {
                for sub in subs {
                    self.node(sub);
                }
            }
            HirKind::Alternation(alts) => {
                let i = self.rng.random_range(0..alts.len());
                self.node(&alts[i]);
            }
        }
    }

    fn repetition(&mut self, rep: &Repetition) {
        // `x?`
        if rep.min == 0 && rep.max == Some(1) {
            if self.rng.random_bool(0.5) {
                self.node(&rep.sub);
            }
            return;
        }
        let count = self.choose_range(rep.min, rep.max);
        for _ in 0..count {
            self.node(&rep.sub);
        }
    }

    fn choose_range(&mut self, low: u32, high: Option<u32>) -> u32 {
        let high = match high {
            Some(high) => high,
            None if low <= 1 => STAR_PLUS_MAX,
            None => low.saturating_add(UNBOUNDED_EXTRA),
        };
        if high > low {
            self.rng.random_range(low..=high)
        } else {
            low
        }
    }
}

/// Pick one code point from inclusive `ranges`, uniformly over their total
/// size. Ranges may span the surrogate gap; such picks are redrawn.
fn choose_code_point<R: Rng + ?Sized>(rng: &mut R, ranges: &[(u32, u32)]) -> char {
    let total: u32 = ranges.iter().map(|(start, end)| end - start + 1).sum();
    loop {
        let mut choice = rng.random_range(0..total);
        for &(start, end) in ranges {
            let len = end - start + 1;
            if choice < len {
                if let Some(c) = char::from_u32(start + choice) {
                    return c;
                }
                break;
            }
            choice -= len;
        }
    }
}
