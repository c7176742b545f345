use crate::error::{Error, Result};

use std::fmt;
use std::str::FromStr;

const MAX_SUBJECT_LENGTH: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(String),
    Single,
    Tail,
}

/// A compiled subject pattern.
///
/// Patterns are dot-delimited. `*` matches exactly one token, and a trailing
/// `>` matches one or more remaining tokens. Everything else matches literally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    tokens: Vec<Token>,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPattern` for empty patterns or tokens, tokens mixing
    /// wildcards with literals, and `>` anywhere but the last token.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        if pattern.len() > MAX_SUBJECT_LENGTH {
            return Err(invalid("pattern is longer than 1024 characters"));
        }

        let raw_tokens: Vec<&str> = pattern.split('.').collect();
        let last = raw_tokens.len() - 1;
        let mut tokens = Vec::with_capacity(raw_tokens.len());

        for (index, token) in raw_tokens.into_iter().enumerate() {
            let compiled = match token {
                "" => return Err(invalid("empty token")),
                "*" => Token::Single,
                ">" if index == last => Token::Tail,
                ">" => return Err(invalid("'>' must be the last token")),
                literal if literal.contains(['*', '>']) => {
                    return Err(invalid("wildcards cannot be mixed with literals"));
                }
                literal => Token::Literal(literal.to_string()),
            };
            tokens.push(compiled);
        }

        Ok(Self {
            raw: pattern.to_string(),
            tokens,
        })
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcards.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.tokens
            .iter()
            .all(|token| matches!(token, Token::Literal(_)))
    }

    /// Tests a concrete subject against the pattern.
    #[must_use]
    pub fn matches(&self, subject: &str) -> bool {
        let mut subject_tokens = subject.split('.');

        for token in &self.tokens {
            match token {
                Token::Tail => return subject_tokens.next().is_some(),
                Token::Single => {
                    if subject_tokens.next().is_none() {
                        return false;
                    }
                }
                Token::Literal(literal) => {
                    if subject_tokens.next() != Some(literal.as_str()) {
                        return false;
                    }
                }
            }
        }

        subject_tokens.next().is_none()
    }
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(pattern: &str) -> Result<Self> {
        Self::parse(pattern)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One-shot match of `subject` against `pattern`. Invalid patterns match nothing.
///
/// Prefer compiling a [`Pattern`] once when matching repeatedly.
#[must_use]
pub fn subject_matches_pattern(subject: &str, pattern: &str) -> bool {
    Pattern::parse(pattern).is_ok_and(|pattern| pattern.matches(subject))
}

/// Checks that a subject is publishable: non-empty tokens and no wildcards.
///
/// # Errors
///
/// Returns `Error::InvalidPattern` describing the first problem found.
pub fn validate_subject(subject: &str) -> Result<()> {
    let pattern = Pattern::parse(subject)?;

    if pattern.is_literal() {
        Ok(())
    } else {
        Err(Error::InvalidPattern {
            pattern: subject.to_string(),
            reason: "wildcards are not allowed in published subjects",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_exact_match() {
        assert!(subject_matches_pattern("orders.new", "orders.new"));
        assert!(!subject_matches_pattern("orders.new", "orders.old"));
        assert!(!subject_matches_pattern("orders.new.item", "orders.new"));
        assert!(!subject_matches_pattern("orders", "orders.new"));
    }

    #[test]
    fn test_single_wildcard() {
        assert!(subject_matches_pattern("orders.new", "orders.*"));
        assert!(subject_matches_pattern("users.123", "users.*"));
        assert!(subject_matches_pattern("a.b.c", "*.b.*"));
        assert!(!subject_matches_pattern("orders.new.item", "orders.*"));
        assert!(!subject_matches_pattern("orders", "orders.*"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches_pattern("a.b", "a.>"));
        assert!(subject_matches_pattern("a.b.c", "a.>"));
        assert!(!subject_matches_pattern("a", "a.>"));
        assert!(!subject_matches_pattern("b.c", "a.>"));
        assert!(subject_matches_pattern("anything", ">"));
        assert!(subject_matches_pattern("any.thing", ">"));
    }

    #[test]
    fn test_tail_and_single_are_distinguished() {
        assert!(subject_matches_pattern("a.b", "a.*"));
        assert!(subject_matches_pattern("a.b", "a.>"));
        assert!(!subject_matches_pattern("a.b.c", "a.*"));
        assert!(subject_matches_pattern("a.b.c", "a.>"));
    }

    #[test]
    fn test_combined_wildcards() {
        assert!(subject_matches_pattern("orders.us.new", "orders.*.>"));
        assert!(subject_matches_pattern("orders.us.new.item", "orders.*.>"));
        assert!(!subject_matches_pattern("orders.new", "orders.*.>"));
        assert!(!subject_matches_pattern("users.us.new", "orders.*.>"));
    }

    #[test]
    fn test_invalid_patterns() {
        for pattern in ["", "a..b", ".a", "a.", "a.>.b", "a.b*", "a.>b", "a.*x"] {
            assert!(
                matches!(Pattern::parse(pattern), Err(Error::InvalidPattern { .. })),
                "{pattern:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_pattern_matches_nothing() {
        assert!(!subject_matches_pattern("a.b", "a.>.b"));
    }

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("orders.new").is_ok());
        assert!(validate_subject("orders.*").is_err());
        assert!(validate_subject("orders.>").is_err());
        assert!(validate_subject("orders..new").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let pattern: Pattern = "orders.*.>".parse().unwrap();

        assert_eq!(pattern.to_string(), "orders.*.>");
        assert!(!pattern.is_literal());
    }

    fn token() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c"]).prop_map(str::to_string)
    }

    fn pattern_token() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["a", "b", "c", "*"]).prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_single_wildcard_semantics(
            subject in prop::collection::vec(token(), 1..5),
            pattern in prop::collection::vec(pattern_token(), 1..5),
        ) {
            let expected = subject.len() == pattern.len()
                && subject
                    .iter()
                    .zip(&pattern)
                    .all(|(s, p)| p == "*" || p == s);

            prop_assert_eq!(
                subject_matches_pattern(&subject.join("."), &pattern.join(".")),
                expected
            );
        }

        #[test]
        fn prop_tail_needs_at_least_one_token(
            prefix in prop::collection::vec(token(), 1..4),
            rest in prop::collection::vec(token(), 0..4),
        ) {
            let pattern = format!("{}.>", prefix.join("."));
            let mut subject = prefix.clone();
            subject.extend(rest.iter().cloned());

            prop_assert_eq!(
                subject_matches_pattern(&subject.join("."), &pattern),
                !rest.is_empty()
            );
        }
    }
}
