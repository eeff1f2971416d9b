use crate::input::Input;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// ASCII letters, digits and punctuation.
const PRINTABLE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
0123456789!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
/// ASCII letters, digits and space. Safe to hand to a shell unquoted word by word.
const SHELL_SAFE_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789 ";

/// Errors raised while constructing a generator. Generation itself never fails.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("max length must be at least 1, got {0}")]
    InvalidMaxLength(usize),

    #[error("structured generator needs at least one field")]
    NoFields,

    #[error("candidate list for field '{0}' is empty")]
    EmptyCandidates(String),
}

/// Produces fuzz inputs one at a time.
///
/// Random generators are unbounded and always return `Some`. Finite sources
/// such as [`crate::corpus::LineCorpus`] return `None` once exhausted.
pub trait Generator: Send {
    /// Short identifier recorded in the session configuration.
    fn name(&self) -> &'static str;

    fn next_input(&mut self) -> Option<Input>;

    /// Number of inputs still available, or `None` for unbounded generators.
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Lazily draws at most `n` inputs. Each item advances the generator, so
    /// a batch cannot be replayed.
    fn next_batch(&mut self, n: usize) -> Batch<'_, Self>
    where
        Self: Sized,
    {
        Batch::new(self, n)
    }
}

/// Finite iterator over the next `n` inputs of a generator.
pub struct Batch<'a, G: Generator + ?Sized> {
    generator: &'a mut G,
    remaining: usize,
}

impl<'a, G: Generator + ?Sized> Batch<'a, G> {
    pub fn new(generator: &'a mut G, n: usize) -> Self {
        Self {
            generator,
            remaining: n,
        }
    }
}

impl<G: Generator + ?Sized> Iterator for Batch<'_, G> {
    type Item = Input;

    fn next(&mut self) -> Option<Input> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let next = self.generator.next_input();
        if next.is_none() {
            self.remaining = 0;
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.generator.remaining() {
            Some(available) => {
                let n = available.min(self.remaining);
                (n, Some(n))
            }
            None => (self.remaining, Some(self.remaining)),
        }
    }
}

fn rng_from_seed(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    }
}

/// Alphabet a [`RandomStringGenerator`] draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Letters, digits and punctuation.
    Printable,
    /// Letters, digits and space, for command-line payloads.
    ShellSafe,
}

impl Charset {
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Charset::Printable => PRINTABLE_CHARSET,
            Charset::ShellSafe => SHELL_SAFE_CHARSET,
        }
    }

    pub fn contains(&self, c: char) -> bool {
        c.is_ascii() && self.bytes().contains(&(c as u8))
    }
}

/// Emits strings whose length is uniform in `[1, max_length]` and whose
/// characters are uniform over the configured [`Charset`].
#[derive(Debug, Clone)]
pub struct RandomStringGenerator {
    max_length: usize,
    charset: Charset,
    rng: ChaCha8Rng,
}

impl RandomStringGenerator {
    /// Printable strings. Pass a seed for a reproducible sequence.
    pub fn new(max_length: usize, seed: Option<u64>) -> Result<Self, GeneratorError> {
        Self::with_charset(max_length, Charset::Printable, seed)
    }

    /// Letters, digits and spaces only.
    pub fn shell_safe(max_length: usize, seed: Option<u64>) -> Result<Self, GeneratorError> {
        Self::with_charset(max_length, Charset::ShellSafe, seed)
    }

    pub fn with_charset(
        max_length: usize,
        charset: Charset,
        seed: Option<u64>,
    ) -> Result<Self, GeneratorError> {
        if max_length == 0 {
            return Err(GeneratorError::InvalidMaxLength(max_length));
        }
        Ok(Self {
            max_length,
            charset,
            rng: rng_from_seed(seed),
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn generate(&mut self) -> String {
        let alphabet = self.charset.bytes();
        let length = self.rng.random_range(1..=self.max_length);
        (0..length)
            .map(|_| alphabet[self.rng.random_range(0..alphabet.len())] as char)
            .collect()
    }
}

impl Generator for RandomStringGenerator {
    fn name(&self) -> &'static str {
        match self.charset {
            Charset::Printable => "random-string",
            Charset::ShellSafe => "shell-safe",
        }
    }

    fn next_input(&mut self) -> Option<Input> {
        Some(Input::Text(self.generate()))
    }
}

/// The candidate values one record field may take.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCandidates {
    pub field: String,
    pub candidates: Vec<JsonValue>,
}

impl FieldCandidates {
    pub fn new(field: impl Into<String>, candidates: Vec<JsonValue>) -> Self {
        Self {
            field: field.into(),
            candidates,
        }
    }
}

/// Builds JSON-shaped records by picking, independently for every field,
/// one value uniformly from that field's candidate list.
///
/// Candidate lists are expected to carry nulls, empty strings and values of
/// the wrong type so that validation paths in the target get exercised.
#[derive(Debug, Clone)]
pub struct StructuredGenerator {
    fields: Vec<FieldCandidates>,
    rng: ChaCha8Rng,
}

impl StructuredGenerator {
    pub fn new(fields: Vec<FieldCandidates>, seed: Option<u64>) -> Result<Self, GeneratorError> {
        if fields.is_empty() {
            return Err(GeneratorError::NoFields);
        }
        if let Some(empty) = fields.iter().find(|f| f.candidates.is_empty()) {
            return Err(GeneratorError::EmptyCandidates(empty.field.clone()));
        }
        Ok(Self {
            fields,
            rng: rng_from_seed(seed),
        })
    }

    pub fn fields(&self) -> &[FieldCandidates] {
        &self.fields
    }

    pub fn generate(&mut self) -> Map<String, JsonValue> {
        let mut record = Map::new();
        for field in &self.fields {
            let pick = self.rng.random_range(0..field.candidates.len());
            record.insert(field.field.clone(), field.candidates[pick].clone());
        }
        record
    }
}

impl Generator for StructuredGenerator {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn next_input(&mut self) -> Option<Input> {
        Some(Input::Record(self.generate()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_max_length_is_rejected_at_construction() {
        assert_eq!(
            RandomStringGenerator::new(0, Some(1)).unwrap_err(),
            GeneratorError::InvalidMaxLength(0)
        );
        assert!(RandomStringGenerator::shell_safe(0, None).is_err());
    }

    #[test]
    fn printable_strings_respect_length_and_alphabet() {
        let mut generator = RandomStringGenerator::new(10, Some(42)).unwrap();
        for _ in 0..500 {
            let s = generator.generate();
            assert!((1..=10).contains(&s.len()), "bad length {}", s.len());
            assert!(
                s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation()),
                "unexpected char in {s:?}"
            );
        }
    }

    #[test]
    fn printable_charset_matches_ascii_classes() {
        let expected = (0u8..128)
            .filter(|b| b.is_ascii_alphanumeric() || b.is_ascii_punctuation())
            .count();
        assert_eq!(PRINTABLE_CHARSET.len(), expected);
        assert_eq!(SHELL_SAFE_CHARSET.len(), 63);
    }

    #[test]
    fn shell_safe_strings_use_letters_digits_and_space() {
        let mut generator = RandomStringGenerator::shell_safe(50, Some(7)).unwrap();
        assert_eq!(generator.name(), "shell-safe");
        for _ in 0..200 {
            let s = generator.generate();
            assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
        }
    }

    #[test]
    fn same_seed_yields_same_sequence() {
        let mut a = RandomStringGenerator::new(10, Some(42)).unwrap();
        let mut b = RandomStringGenerator::new(10, Some(42)).unwrap();
        let first: Vec<Input> = a.next_batch(5).collect();
        let second: Vec<Input> = b.next_batch(5).collect();
        assert_eq!(first, second);

        let mut c = RandomStringGenerator::new(10, Some(43)).unwrap();
        let third: Vec<Input> = c.next_batch(5).collect();
        assert_ne!(first, third);
    }

    #[test]
    fn batches_advance_the_generator() {
        let mut generator = RandomStringGenerator::new(20, Some(3)).unwrap();
        let first: Vec<Input> = generator.next_batch(4).collect();
        let second: Vec<Input> = generator.next_batch(4).collect();
        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_ne!(first, second);
        assert_eq!(generator.next_batch(0).count(), 0);
    }

    #[test]
    fn structured_generator_rejects_empty_candidate_lists() {
        let fields = vec![
            FieldCandidates::new("name", vec![json!("Alice")]),
            FieldCandidates::new("age", vec![]),
        ];
        assert_eq!(
            StructuredGenerator::new(fields, None).unwrap_err(),
            GeneratorError::EmptyCandidates("age".to_string())
        );
        assert_eq!(
            StructuredGenerator::new(Vec::new(), None).unwrap_err(),
            GeneratorError::NoFields
        );
    }

    #[test]
    fn structured_records_draw_from_candidates() {
        let names = vec![json!("Alice"), json!(""), JsonValue::Null];
        let ages = vec![json!(22), json!("twenty")];
        let mut generator = StructuredGenerator::new(
            vec![
                FieldCandidates::new("name", names.clone()),
                FieldCandidates::new("age", ages.clone()),
            ],
            Some(11),
        )
        .unwrap();

        let mut seen_names = std::collections::HashSet::new();
        for input in generator.next_batch(200) {
            let record = input.as_record().expect("structured input is a record");
            assert_eq!(record.len(), 2);
            assert!(names.contains(&record["name"]));
            assert!(ages.contains(&record["age"]));
            seen_names.insert(record["name"].to_string());
        }
        assert_eq!(seen_names.len(), 3, "every candidate should show up eventually");
    }
}
