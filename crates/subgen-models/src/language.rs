//! Subtitle target language codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A subtitle target language code (e.g. `ko`, `en`).
///
/// Codes are normalized to lowercase so that `Ko` and `ko` name the
/// same artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Create a new language code, normalizing to lowercase.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_lowercase())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A code is usable if it is non-empty ASCII letters (2-8 chars).
    pub fn is_valid(&self) -> bool {
        let len = self.0.len();
        (2..=8).contains(&len) && self.0.bytes().all(|b| b.is_ascii_lowercase())
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        assert_eq!(LanguageCode::new(" KO ").as_str(), "ko");
        assert_eq!(LanguageCode::new("en"), LanguageCode::new("EN"));
    }

    #[test]
    fn validity() {
        assert!(LanguageCode::new("ko").is_valid());
        assert!(LanguageCode::new("en").is_valid());
        assert!(!LanguageCode::new("").is_valid());
        assert!(!LanguageCode::new("e").is_valid());
        assert!(!LanguageCode::new("en-US").is_valid());
    }
}
