use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^vch_[A-Za-z0-9_-]+$").expect("token pattern should compile"));

/// Canonical voucher identifier: `vch_` followed by one or more URL-safe
/// characters. Constructed only through [`Token::parse`]; immutable once
/// built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Validate `candidate` against the voucher pattern. Surrounding
    /// whitespace is tolerated; anything else yields `None`.
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim();
        TOKEN_PATTERN
            .is_match(trimmed)
            .then(|| Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
