//! Comprehension Feedback Interpretation
//!
//! After listening to a response, the learner rates how well they understood
//! each word. This module lines those ratings up with the annotated text the
//! client was shown and picks out the words that need to be explained again.

use crate::alignment::recover_words;
use serde_json::Value;
use thiserror::Error;

/// Scores strictly below this value mark a word as not understood.
pub const COMPREHENSION_THRESHOLD: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComprehensionError {
    #[error("Comprehension score at position {index} is not an integer: {value}")]
    InvalidScoreFormat { index: usize, value: String },
    #[error("Received {scores} comprehension scores for {words} words")]
    LengthMismatch { scores: usize, words: usize },
}

/// Coerces a single raw score to an integer.
///
/// Integers are taken as-is, finite floats are truncated toward zero and
/// booleans count as 0 or 1. Strings must hold a base-10 integer literal once
/// surrounding whitespace is trimmed; single underscores may separate digits.
/// Out-of-range magnitudes saturate, which keeps their side of the threshold.
/// Everything else is rejected.
pub fn parse_score(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i),
            None => n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        },
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => parse_int_literal(s.trim()),
        _ => None,
    }
}

fn parse_int_literal(s: &str) -> Option<i64> {
    let (negative, digits) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }

    let mut magnitude: i64 = 0;
    for c in digits.chars().filter(|&c| c != '_') {
        let digit = c.to_digit(10)?;
        magnitude = magnitude.saturating_mul(10).saturating_add(i64::from(digit));
    }
    Some(if negative { -magnitude } else { magnitude })
}

/// Coerces a whole batch of scores. A single bad entry fails the batch.
pub fn parse_scores(raw: &[Value]) -> Result<Vec<i64>, ComprehensionError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            parse_score(value).ok_or_else(|| ComprehensionError::InvalidScoreFormat {
                index,
                value: value.to_string(),
            })
        })
        .collect()
}

/// Returns the words of `annotated` whose score is below the threshold.
///
/// Scores are matched to words by position, so both sequences must have the
/// same length. The selected words keep their original order and spelling,
/// and a word that appears twice with low scores is returned twice. An empty
/// result means nothing needs clarifying.
pub fn interpret(raw_scores: &[Value], annotated: &str) -> Result<Vec<String>, ComprehensionError> {
    let scores = parse_scores(raw_scores)?;
    let words = recover_words(annotated);

    if scores.len() != words.len() {
        return Err(ComprehensionError::LengthMismatch {
            scores: scores.len(),
            words: words.len(),
        });
    }

    Ok(words
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score < COMPREHENSION_THRESHOLD)
        .map(|(word, _)| word)
        .collect())
}
