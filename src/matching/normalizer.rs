use std::fmt;

use serde::{Deserialize, Serialize};

/// An organization or product name in canonical comparison form.
///
/// Uppercase ASCII alphanumerics separated by whitespace. Never persisted;
/// always derived from the raw text with [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedName(String);

impl NormalizedName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whitespace-separated tokens, duplicates kept.
    pub fn tokens(&self) -> Vec<&str> {
        self.0.split_whitespace().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize free text for comparison.
///
/// Hyphens become spaces, anything that is not an ASCII letter, digit or
/// whitespace is deleted, and the result is uppercased. Idempotent.
pub fn normalize(name: &str) -> NormalizedName {
    let normalized = name
        .replace('-', " ")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();

    NormalizedName(normalized)
}
