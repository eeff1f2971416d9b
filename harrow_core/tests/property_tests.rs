//! Property-based tests for harrow_core
//!
//! Generator shape, session completeness and result-file round trips are
//! checked over arbitrary seeds, lengths and case counts.

use std::sync::Arc;

use harrow_core::{
    ExecutionStatus, FieldCandidates, Generator, Input, InProcessTarget, LineCorpus,
    RandomStringGenerator, ResultStore, Runner, RunnerConfig, StructuredGenerator, Target,
};
use proptest::prelude::*;
use serde_json::{Value as JsonValue, json};

// ============================================================================
// Strategies
// ============================================================================

/// Candidate values mixing valid, empty, null and wrongly typed entries
fn candidate_value() -> impl Strategy<Value = JsonValue> {
    prop_oneof![
        Just(JsonValue::Null),
        Just(json!("")),
        "[a-zA-Z]{1,10}".prop_map(JsonValue::from),
        any::<i64>().prop_map(JsonValue::from),
        any::<bool>().prop_map(JsonValue::from),
    ]
}

fn field_candidates() -> impl Strategy<Value = Vec<FieldCandidates>> {
    prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(candidate_value(), 1..6), 1..5)
        .prop_map(|fields| {
            fields
                .into_iter()
                .map(|(field, values)| FieldCandidates::new(field, values))
                .collect()
        })
}

/// Fails on inputs containing "fail", echoes everything else
fn flaky_target() -> Arc<dyn Target> {
    Arc::new(InProcessTarget::new("flaky", |input: &Input| {
        let text = input.to_string();
        if text.contains("fail") || text.contains('!') {
            anyhow::bail!("Invalid input: {text}");
        }
        Ok(format!("Processed: {text}"))
    }))
}

// ============================================================================
// Generator properties
// ============================================================================

proptest! {
    #[test]
    fn random_strings_stay_in_bounds(max_length in 1usize..200, seed in any::<u64>()) {
        let mut generator = RandomStringGenerator::new(max_length, Some(seed)).unwrap();
        for input in generator.next_batch(50) {
            let text = input.as_text().unwrap();
            prop_assert!(!text.is_empty());
            prop_assert!(text.len() <= max_length);
            prop_assert!(
                text.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_punctuation())
            );
        }
    }

    #[test]
    fn structured_values_come_from_their_candidate_sets(
        fields in field_candidates(),
        seed in any::<u64>(),
    ) {
        let mut generator = StructuredGenerator::new(fields.clone(), Some(seed)).unwrap();
        for input in generator.next_batch(30) {
            let record = input.as_record().unwrap();
            prop_assert_eq!(record.len(), fields.len());
            for field in &fields {
                prop_assert!(field.candidates.contains(&record[&field.field]));
            }
        }
    }

    #[test]
    fn corpus_yields_each_non_blank_line_once(
        lines in prop::collection::vec("[ a-z]{0,12}", 0..30),
    ) {
        let text = lines.join("\n");
        let expected: Vec<Input> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(Input::from)
            .collect();
        let mut corpus = LineCorpus::from_text(&text);
        let drawn: Vec<Input> = corpus.next_batch(usize::MAX).collect();
        prop_assert_eq!(drawn, expected);
    }
}

// ============================================================================
// Session properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_drawn_input_gets_one_outcome(
        count in 0usize..60,
        seed in any::<u64>(),
        workers in 1usize..4,
    ) {
        let mut generator = RandomStringGenerator::new(12, Some(seed)).unwrap();
        let expected: Vec<Input> = RandomStringGenerator::new(12, Some(seed))
            .unwrap()
            .next_batch(count)
            .collect();
        let session = Runner::new(RunnerConfig { case_count: count, timeout: None, workers })
            .run(&mut generator, flaky_target());

        prop_assert_eq!(session.len(), count);
        for (outcome, input) in session.outcomes().iter().zip(&expected) {
            prop_assert_eq!(outcome.input(), input);
            let is_error = matches!(outcome.status(), ExecutionStatus::Error(_));
            prop_assert_eq!(outcome.output().is_some(), !is_error);
        }
    }

    #[test]
    fn saved_sessions_round_trip(count in 0usize..25, seed in any::<u64>()) {
        let mut generator = RandomStringGenerator::new(20, Some(seed)).unwrap();
        let session = Runner::new(RunnerConfig { case_count: count, ..Default::default() })
            .run(&mut generator, flaky_target());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        ResultStore::save(&session, &path).unwrap();
        let loaded = ResultStore::load(&path).unwrap();
        prop_assert_eq!(loaded.as_slice(), session.outcomes());
    }
}
