use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::error::GenError;
use crate::template::LoremUnit;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Extra length allowed above `min` when no maximum is given.
const DEFAULT_EXTRA_LEN: usize = 20;

const IDENTIFIER_LEN: (usize, usize) = (1, 20);

const LOREM_DEFAULT_MAX: usize = 10;
const SENTENCE_WORDS: (usize, usize) = (4, 12);
const PARAGRAPH_SENTENCES: (usize, usize) = (3, 6);

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "eu", "fugiat", "nulla", "pariatur", "excepteur",
    "sint", "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia",
    "deserunt", "mollit", "anim", "id", "est", "laborum",
];

// ---------------------------------- Strings ------------------------------- //

/// Alphanumeric string with a length in `[min, max]`.
pub fn random_string<R: Rng + ?Sized>(rng: &mut R, min: Option<usize>, max: Option<usize>) -> String {
    let min = min.unwrap_or(0);
    let max = max.unwrap_or(min + DEFAULT_EXTRA_LEN).max(min);
    let len = rng.random_range(min..=max);
    (0..len)
        .map(|_| ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// Candidate value for an identifier node.
pub fn identifier<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_string(rng, Some(IDENTIFIER_LEN.0), Some(IDENTIFIER_LEN.1))
}

// ----------------------------------- Lorem -------------------------------- //

/// `min..=max` counts `unit`s: words, sentences or paragraphs.
pub fn lorem<R: Rng + ?Sized>(
    rng: &mut R,
    min: Option<usize>,
    max: Option<usize>,
    unit: LoremUnit,
) -> String {
    let min = min.unwrap_or(1);
    let max = max.unwrap_or(LOREM_DEFAULT_MAX).max(min);
    let count = rng.random_range(min..=max);
    match unit {
        LoremUnit::Words => words(rng, count),
        LoremUnit::Sentences => sentences(rng, count),
        LoremUnit::Paragraphs => (0..count)
            .map(|_| {
                let n = rng.random_range(PARAGRAPH_SENTENCES.0..=PARAGRAPH_SENTENCES.1);
                sentences(rng, n)
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn words<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
    (0..count)
        .filter_map(|_| LOREM_WORDS.choose(rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn sentences<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
    (0..count)
        .map(|_| {
            let n = rng.random_range(SENTENCE_WORDS.0..=SENTENCE_WORDS.1);
            let mut sentence = capitalize(&words(rng, n));
            sentence.push('.');
            sentence
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ----------------------------------- Books -------------------------------- //

#[derive(Debug)]
struct Book {
    text: String,
    chars: usize,
}

/// Source texts, read and UTF-8 checked once per path.
#[derive(Debug, Default)]
pub struct BookCache {
    books: HashMap<PathBuf, Book>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&mut self, path: &Path) -> Result<&Book, GenError> {
        let slot = match self.books.entry(path.to_path_buf()) {
            Entry::Occupied(slot) => return Ok(slot.into_mut()),
            Entry::Vacant(slot) => slot,
        };
        let bytes = std::fs::read(path).map_err(|source| GenError::SourceText {
            path: path.to_path_buf(),
            source,
        })?;
        let text =
            String::from_utf8(bytes).map_err(|_| GenError::SourceTextUtf8(path.to_path_buf()))?;
        if text.is_empty() {
            tracing::warn!(path = %path.display(), "source text is empty");
        }
        let chars = text.chars().count();
        Ok(slot.insert(Book { text, chars }))
    }

    /// A window of `[min, max]` chars at a random char offset. `max`
    /// defaults to, and both bounds are clamped to, the text length.
    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        path: &Path,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<String, GenError> {
        let book = self.load(path)?;
        let max = max.unwrap_or(book.chars).min(book.chars);
        let min = min.unwrap_or(0).min(max);
        let len = rng.random_range(min..=max);
        let start = rng.random_range(0..=book.chars - len);
        Ok(book.text.chars().skip(start).take(len).collect())
    }
}
