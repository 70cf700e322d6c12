//! Lexical filter over stemmed banned words.
//!
//! The banned list is normalized and reduced to Snowball (English) stems once
//! at startup. Incoming text goes through the same normalization and stemming
//! before each token is looked up, so inflected forms ("spamming", "Spams!")
//! match the listed word.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use rust_stemmers::{Algorithm, Stemmer};

/// Lowercase `input`, drop everything that is not a letter or whitespace, and
/// collapse whitespace runs into single spaces.
pub fn normalize(input: &str) -> String {
    let letters: String = input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();

    letters.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Errors raised while loading the banned word list.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("Failed to read banned word list '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse banned word list '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable set of banned word stems.
///
/// Built once per process and shared read-only between requests.
pub struct BannedStemSet {
    stems: HashSet<String>,
    stemmer: Stemmer,
}

impl BannedStemSet {
    /// Build the set from raw words. Words that normalize to nothing are skipped.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stemmer = Stemmer::create(Algorithm::English);
        let stems = words
            .into_iter()
            .map(|word| normalize(word.as_ref()))
            .filter(|word| !word.is_empty())
            .map(|word| stem_with(&stemmer, &word))
            .collect();

        Self { stems, stemmer }
    }

    /// Load a JSON array of strings from `path` and build the set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let shown = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| FilterError::Io {
            path: shown.clone(),
            source: e,
        })?;

        let words: Vec<String> =
            serde_json::from_str(&content).map_err(|e| FilterError::Parse {
                path: shown.clone(),
                source: e,
            })?;

        let set = Self::from_words(&words);
        if set.is_empty() {
            tracing::warn!(path = %shown, "Banned word list is empty - lexical filter accepts everything");
        }
        tracing::info!(path = %shown, words = words.len(), stems = set.len(), "Loaded banned word stems");

        Ok(set)
    }

    /// Exact lookup of an already-stemmed token.
    pub fn contains(&self, stem: &str) -> bool {
        self.stems.contains(stem)
    }

    /// Stem a single normalized word, falling back to the word itself.
    pub fn stem(&self, word: &str) -> String {
        stem_with(&self.stemmer, word)
    }

    /// Whether any token of `text` stems to a banned stem.
    pub fn contains_banned(&self, text: &str) -> bool {
        if self.stems.is_empty() {
            return false;
        }

        normalize(text)
            .split_whitespace()
            .any(|token| self.contains(&self.stem(token)))
    }

    pub fn len(&self) -> usize {
        self.stems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

fn stem_with(stemmer: &Stemmer, word: &str) -> String {
    let stemmed = stemmer.stem(word);
    if stemmed.is_empty() {
        word.to_string()
    } else {
        stemmed.into_owned()
    }
}

impl PartialEq for BannedStemSet {
    fn eq(&self, other: &Self) -> bool {
        self.stems == other.stems
    }
}

impl fmt::Debug for BannedStemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BannedStemSet")
            .field("stems", &self.stems.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Buy SPAM now!!"), "buy spam now");
        assert_eq!(normalize("  hello,\t\n  world... "), "hello world");
        assert_eq!(normalize("r2-d2 & c3po"), "rd cpo");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_normalize_output_alphabet() {
        let samples = [
            "Hello World",
            "  MiXeD   case\twith\ttabs  ",
            "numbers 123 and symbols #$%^",
            "Ünïcödé ÄÖÜ straße",
            "line\nbreaks\r\nand   spaces",
            "",
        ];

        for sample in samples {
            let out = normalize(sample);
            assert!(!out.starts_with(' ') && !out.ends_with(' '), "{:?}", out);
            assert!(!out.contains("  "), "double space in {:?}", out);
            assert!(
                out.chars().all(|c| c == ' ' || (c.is_alphabetic() && !c.is_uppercase())),
                "unexpected char in {:?}",
                out
            );
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Buy SPAM now!!",
            "Ünïcödé ÄÖÜ straße",
            "  a  b\tc\n",
            "İstanbul",
            "don't stop-believing",
        ];

        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_stems_match_inflections() {
        let set = BannedStemSet::from_words(["spam"]);
        assert!(set.contains("spam"));
        assert!(set.contains_banned("Buy SPAM now!!"));
        assert!(set.contains_banned("stop spamming me"));
        assert!(set.contains_banned("so many spams"));
        assert!(!set.contains_banned("a perfectly clean sentence"));
    }

    #[test]
    fn test_banned_words_are_normalized_first() {
        let set = BannedStemSet::from_words(["  SPAM!! ", "", "..."]);
        assert_eq!(set.len(), 1);
        assert!(set.contains_banned("spam"));
    }

    #[test]
    fn test_building_twice_is_equivalent() {
        let words = ["spam", "running", "Scam!", "fraudulent"];
        let first = BannedStemSet::from_words(words);
        let second = BannedStemSet::from_words(words);

        assert_eq!(first, second);
        for probe in ["spam", "run", "scam", "hello"] {
            assert_eq!(first.contains(probe), second.contains(probe));
        }
    }

    #[test]
    fn test_stem_reduces_word() {
        let set = BannedStemSet::from_words(Vec::<String>::new());
        assert_eq!(set.stem("running"), "run");
        assert!(set.is_empty());
        assert!(!set.contains_banned("running"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["spam", "scam"]"#).unwrap();

        let set = BannedStemSet::load(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains_banned("what a scam"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = BannedStemSet::load("/nonexistent/banned_words.json").unwrap_err();
        assert!(matches!(err, FilterError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"words": ["spam"]}}"#).unwrap();

        let err = BannedStemSet::load(file.path()).unwrap_err();
        assert!(matches!(err, FilterError::Parse { .. }));
    }

    #[test]
    fn test_load_empty_list_accepts_everything() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();

        let set = BannedStemSet::load(file.path()).unwrap();
        assert!(set.is_empty());
        assert!(!set.contains_banned("anything at all"));
    }

    #[test]
    fn test_load_error_names_the_file() {
        let err = BannedStemSet::load("/nonexistent/words.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/words.json"), "{}", err);
    }
}
