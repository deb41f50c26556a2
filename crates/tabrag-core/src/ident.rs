//! Validated SQL identifiers.
//!
//! Table and column names are interpolated into statement text, so they are
//! restricted to a closed alphabet and always emitted double-quoted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Longest accepted identifier, in bytes.
pub const MAX_IDENT_LEN: usize = 63;

/// A table or column name that is safe to place in SQL text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Validate `name` as an identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(RagError::invalid_identifier(name, "empty"));
        }
        if name.len() > MAX_IDENT_LEN {
            return Err(RagError::invalid_identifier(
                name,
                format!("longer than {} bytes", MAX_IDENT_LEN),
            ));
        }

        let mut chars = name.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !first_ok {
            return Err(RagError::invalid_identifier(
                name,
                "must start with a letter or underscore",
            ));
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            return Err(RagError::invalid_identifier(
                name.clone(),
                format!("unexpected character {:?}", bad),
            ));
        }

        Ok(Self(name))
    }

    /// Derive a related identifier, e.g. `cars` + `_fts`.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}{}", self.0, suffix))
    }

    /// The bare name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name double-quoted for SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ident {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Ident> for String {
    fn from(value: Ident) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert_eq!(Ident::new("cars").unwrap().as_str(), "cars");
        assert_eq!(Ident::new("trim_description").unwrap().quoted(), "\"trim_description\"");
        assert!(Ident::new("_private9").is_ok());
    }

    #[test]
    fn test_rejects_injection() {
        assert!(Ident::new("cars; DROP TABLE cars").is_err());
        assert!(Ident::new("a\"b").is_err());
        assert!(Ident::new("price_($)").is_err());
        assert!(Ident::new("9lives").is_err());
        assert!(Ident::new("").is_err());
        assert!(Ident::new("x".repeat(64)).is_err());
    }

    #[test]
    fn test_with_suffix() {
        let table = Ident::new("cars").unwrap();
        assert_eq!(table.with_suffix("_fts").unwrap().as_str(), "cars_fts");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Ident = serde_json::from_str("\"make\"").unwrap();
        assert_eq!(ok.as_str(), "make");
        assert!(serde_json::from_str::<Ident>("\"bad name\"").is_err());
    }
}
