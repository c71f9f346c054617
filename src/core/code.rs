//! ICD-10 code value type.
//!
//! An [`IcdCode`] can only be built from text that matches the ICD-10
//! lexical pattern: a category (one letter, one digit, one digit or
//! letter) optionally followed by a dot and a 1-4 character subdivision.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Anchored pattern for a complete code.
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][0-9][0-9A-Z](?:\.[0-9A-Z]{1,4})?$").unwrap_or_else(|_| unreachable!())
});

/// Whole code-shaped tokens in free text. Dotted and hyphenated tails are
/// swallowed so a malformed token is never cut down to a valid prefix.
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][0-9A-Za-z]*(?:[.\-][0-9A-Za-z]+)*").unwrap_or_else(|_| unreachable!())
});

/// A validated, upper-cased ICD-10 code such as `E11.9` or `I10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IcdCode(String);

impl IcdCode {
    /// Parses a code, trimming whitespace and ignoring case.
    ///
    /// Returns `None` when the text does not match the ICD-10 pattern.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        CODE_RE.is_match(&normalized).then_some(Self(normalized))
    }

    /// The code as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The three-character category (`E11` for `E11.9`).
    #[must_use]
    pub fn category(&self) -> &str {
        &self.0[..3]
    }

    /// The subdivision after the dot, if any.
    #[must_use]
    pub fn subdivision(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, sub)| sub)
    }

    /// Iterates over every code-shaped token in `text`, with byte ranges.
    ///
    /// Only upper-case tokens are considered so ordinary prose does not
    /// produce spurious matches. Tokens such as `E11.12345` or `E11-9`
    /// are dropped whole rather than yielding `E11`.
    pub fn scan(text: &str) -> impl Iterator<Item = (std::ops::Range<usize>, Self)> + '_ {
        TOKEN_RE
            .find_iter(text)
            .filter(|m| CODE_RE.is_match(m.as_str()))
            .map(|m| (m.range(), Self(m.as_str().to_string())))
    }
}

impl fmt::Display for IcdCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for IcdCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not an ICD-10 code: {s:?}"))
    }
}

impl AsRef<str> for IcdCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for IcdCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for IcdCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid ICD-10 code {raw:?}")))
    }
}
