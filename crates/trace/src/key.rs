//! Atomic path segments: names, indices and the no-key marker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::TraceError;

// ---------------------------------------------------------------------------
// Name
// ---------------------------------------------------------------------------

/// An identifier matching `[A-Za-z_][A-Za-z0-9_]*`.
///
/// Module names and port names are `Name`s, which guarantees that they never
/// collide with the separators of the canonical trace syntax.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Validate and wrap an identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, TraceError> {
        let name = name.into();
        if is_identifier(&name) {
            Ok(Self(name))
        } else {
            Err(TraceError::InvalidName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_part),
        _ => false,
    }
}

impl TryFrom<String> for Name {
    type Error = TraceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl FromStr for Name {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// A non-negative integer key: a loop iteration or an array position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index(u32);

impl Index {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Index {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Only the canonical decimal form is accepted: ASCII digits, no sign, and
/// no leading zeros (except for `0` itself), so rendering reproduces the input.
impl FromStr for Index {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = !s.is_empty()
            && s.bytes().all(|b| b.is_ascii_digit())
            && (s == "0" || !s.starts_with('0'));
        if !canonical {
            return Err(TraceError::InvalidIndex(s.to_owned()));
        }
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| TraceError::InvalidIndex(s.to_owned()))
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// One path segment.
///
/// `Name` and `Index` keys never compare equal. The derived order places
/// `NoKey` first, then names (lexicographic), then indices (numeric).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    NoKey,
    Name(Name),
    Index(Index),
}

impl From<Name> for Key {
    fn from(name: Name) -> Self {
        Key::Name(name)
    }
}

impl From<Index> for Key {
    fn from(index: Index) -> Self {
        Key::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::NoKey => Ok(()),
            Key::Name(name) => name.fmt(f),
            Key::Index(index) => index.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_validated() {
        assert!(Name::new("loop").is_ok());
        assert!(Name::new("_tmp9").is_ok());
        assert!(matches!(Name::new("9lives"), Err(TraceError::InvalidName(_))));
        assert!(Name::new("").is_err());
        assert!(Name::new("a-b").is_err());
        assert!(Name::new("ä").is_err());
    }

    #[test]
    fn only_canonical_indices_parse() {
        assert_eq!("0".parse::<Index>().unwrap(), Index::new(0));
        assert_eq!("42".parse::<Index>().unwrap(), Index::new(42));
        assert!("007".parse::<Index>().is_err());
        assert!("+1".parse::<Index>().is_err());
        assert!("".parse::<Index>().is_err());
        assert!("99999999999".parse::<Index>().is_err());
    }

    #[test]
    fn names_and_indices_never_compare_equal() {
        let name = Key::Name(Name::new("a").unwrap());
        let index = Key::Index(Index::new(0));
        assert_ne!(name, index);
        assert!(Key::NoKey < name && name < index);
    }

    #[test]
    fn name_deserialization_rejects_non_identifiers() {
        let ok: Name = serde_json::from_str("\"port\"").unwrap();
        assert_eq!(ok.as_str(), "port");
        assert!(serde_json::from_str::<Name>("\"a b\"").is_err());
    }
}
