//! Timestamp Alignment
//!
//! Fuses a generated response with the word timings reported by speech
//! synthesis. The result is the annotated text exchanged with the client,
//! where every timed word carries an inline `[<offset>ms]` suffix.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TIMESTAMP_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\[\d+ms\]$").expect("timestamp suffix pattern is valid"));

/// A synthesis-produced word and the offset at which it is spoken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub offset_ms: u64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, offset_ms: u64) -> Self {
        Self {
            word: word.into(),
            offset_ms,
        }
    }
}

/// Splits text into its canonical word sequence.
pub fn split_words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Renders `text` with the offset of `timings[i]` attached to word `i`.
///
/// Timings are matched by position only; the `word` they carry is not
/// compared against the text. Words past the end of `timings` stay bare.
pub fn align(text: &str, timings: &[WordTiming]) -> String {
    split_words(text)
        .into_iter()
        .enumerate()
        .map(|(i, word)| match timings.get(i) {
            Some(timing) => format!("{}[{}ms]", word, timing.offset_ms),
            None => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Recovers the word sequence from annotated text by stripping a trailing
/// `[<digits>ms]` from every token that has one.
pub fn recover_words(annotated: &str) -> Vec<String> {
    annotated
        .split_whitespace()
        .map(|token| match TIMESTAMP_SUFFIX.captures(token) {
            Some(caps) => caps[1].to_string(),
            None => token.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_partial_timings() {
        let timings = vec![WordTiming::new("hello", 100)];
        assert_eq!(align("hello world", &timings), "hello[100ms] world");
    }

    #[test]
    fn test_align_full_timings() {
        let timings = vec![
            WordTiming::new("Bonjour", 6),
            WordTiming::new("tout", 512),
            WordTiming::new("le", 700),
            WordTiming::new("monde.", 812),
        ];
        assert_eq!(
            align("Bonjour tout le monde.", &timings),
            "Bonjour[6ms] tout[512ms] le[700ms] monde.[812ms]"
        );
    }

    #[test]
    fn test_align_without_timings_renders_bare_words() {
        assert_eq!(align("  one\ttwo\nthree  ", &[]), "one two three");
        assert_eq!(align("", &[]), "");
    }

    #[test]
    fn test_align_ignores_surplus_timings() {
        let timings = vec![
            WordTiming::new("a", 0),
            WordTiming::new("b", 10),
            WordTiming::new("c", 20),
        ];
        assert_eq!(align("a b", &timings), "a[0ms] b[10ms]");
    }

    #[test]
    fn test_align_trusts_position_not_content() {
        let timings = vec![WordTiming::new("different", 42)];
        assert_eq!(align("hola amigo", &timings), "hola[42ms] amigo");
    }

    #[test]
    fn test_timestamp_only_below_timing_count() {
        let text = "the quick brown fox jumps";
        for count in 0..=5 {
            let timings: Vec<WordTiming> = (0..count)
                .map(|i| WordTiming::new("w", i as u64 * 100))
                .collect();
            let annotated = align(text, &timings);
            for (i, token) in annotated.split(' ').enumerate() {
                assert_eq!(token.ends_with("ms]"), i < count, "token {i} of {annotated}");
            }
        }
    }

    #[test]
    fn test_recover_words_round_trip() {
        let text = "Le chat est sur la table, n'est-ce pas?";
        let expected: Vec<String> = split_words(text).into_iter().map(String::from).collect();
        for count in [0, 1, 4, 8, 20] {
            let timings: Vec<WordTiming> = (0..count)
                .map(|i| WordTiming::new("x", i as u64 * 37))
                .collect();
            assert_eq!(recover_words(&align(text, &timings)), expected);
        }
    }

    #[test]
    fn test_recover_words_keeps_unmatched_tokens_verbatim() {
        assert_eq!(
            recover_words("a[12ms] b[ms] [5ms] c[5s] d[3ms]x"),
            vec!["a", "b[ms]", "[5ms]", "c[5s]", "d[3ms]x"]
        );
    }

    #[test]
    fn test_recover_words_strips_only_the_last_suffix() {
        assert_eq!(recover_words("x[1ms][2ms]"), vec!["x[1ms]"]);
    }
}
