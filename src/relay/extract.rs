//! Extraction of `[[...]]`-delimited values from free-form model output.
//!
//! Two grammars, both scanning left to right and returning the first match
//! only:
//!
//! - **integer**: `[[` digits `]]`
//! - **words**: `[[` (word-chars, then optional whitespace)+ `]]`
//!
//! Word characters are ASCII `[0-9A-Za-z_]`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([0-9]+)\]\]").expect("integer grammar is valid")
});

static WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[((?:[0-9A-Za-z_]+[\t\n\x0C\r ]*)+)\]\]")
        .expect("word grammar is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Integer,
    Words,
}

impl Grammar {
    fn regex(self) -> &'static Regex {
        match self {
            Grammar::Integer => &INTEGER,
            Grammar::Words => &WORDS,
        }
    }
}

/// No delimited value in the text. Carries the full source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no delimited value in: {source_text}")]
pub struct NoMatch {
    pub source_text: String,
}

/// A matched value, borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extracted<'a> {
    /// The digit run, exactly as written (leading zeros kept).
    Integer(&'a str),
    /// The word sequence including interior and trailing whitespace the
    /// grammar captured.
    Words(&'a str),
}

impl<'a> Extracted<'a> {
    pub fn as_str(&self) -> &'a str {
        match *self {
            Extracted::Integer(s) | Extracted::Words(s) => s,
        }
    }

    /// Numeric value of an integer match; `None` for word matches or a
    /// digit run too long for `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Extracted::Integer(s) => s.parse().ok(),
            Extracted::Words(_) => None,
        }
    }
}

pub fn extract(grammar: Grammar, text: &str) -> Result<Extracted<'_>, NoMatch> {
    let captured = grammar
        .regex()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| NoMatch { source_text: text.to_string() })?;

    Ok(match grammar {
        Grammar::Integer => Extracted::Integer(captured),
        Grammar::Words => Extracted::Words(captured),
    })
}

pub fn extract_integer(text: &str) -> Result<Extracted<'_>, NoMatch> {
    extract(Grammar::Integer, text)
}

pub fn extract_words(text: &str) -> Result<Extracted<'_>, NoMatch> {
    extract(Grammar::Words, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_inside_text() {
        let m = extract_integer("prefix [[42]] suffix").unwrap();
        assert_eq!(m.as_str(), "42");
        assert_eq!(m.as_u64(), Some(42));
    }

    #[test]
    fn integer_first_match_only() {
        assert_eq!(extract_integer("[[7]] and [[9]]").unwrap().as_str(), "7");
    }

    #[test]
    fn integer_skips_non_numeric_brackets() {
        assert_eq!(extract_integer("[[seven]] then [[8]]").unwrap().as_str(), "8");
    }

    #[test]
    fn integer_keeps_leading_zeros() {
        let m = extract_integer("code [[007]]").unwrap();
        assert_eq!(m.as_str(), "007");
        assert_eq!(m.as_u64(), Some(7));
    }

    #[test]
    fn integer_overflow_still_matches() {
        let m = extract_integer("[[123456789012345678901234567890]]").unwrap();
        assert_eq!(m.as_str().len(), 30);
        assert_eq!(m.as_u64(), None);
    }

    #[test]
    fn integer_rejects_signed_and_spaced() {
        assert!(extract_integer("[[-5]]").is_err());
        assert!(extract_integer("[[ 5 ]]").is_err());
        assert!(extract_integer("[5]").is_err());
    }

    #[test]
    fn words_with_spaces() {
        assert_eq!(extract_words("say [[hello world]] now").unwrap().as_str(), "hello world");
    }

    #[test]
    fn words_keep_trailing_space() {
        assert_eq!(extract_words("[[hello world ]]").unwrap().as_str(), "hello world ");
    }

    #[test]
    fn words_first_match_only() {
        assert_eq!(extract_words("[[alpha]] [[beta]]").unwrap().as_str(), "alpha");
    }

    #[test]
    fn words_reject_punctuation_and_leading_space() {
        assert!(extract_words("[[hello, world]]").is_err());
        assert!(extract_words("[[ hello]]").is_err());
        assert!(extract_words("[[]]").is_err());
    }

    #[test]
    fn words_accept_digits_and_underscores() {
        assert_eq!(extract_words("[[snake_case 42]]").unwrap().as_str(), "snake_case 42");
    }

    #[test]
    fn no_delimiters_is_no_match_with_full_text() {
        let text = "No number here.";
        let err = extract_integer(text).unwrap_err();
        assert_eq!(err.source_text, text);
        assert!(extract_words(text).is_err());
    }

    #[test]
    fn word_match_has_no_integer_value() {
        assert_eq!(extract_words("[[12]]").unwrap().as_u64(), None);
    }
}
