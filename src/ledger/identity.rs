//! Identity normalization.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Longest identity kept after normalization.
pub const MAX_IDENTITY_LEN: usize = 60;

/// A normalized display name used as the accounting key.
///
/// Lower-case ASCII letters and digits, with every other run of characters
/// collapsed to a single `-` and no leading or trailing `-`. Two display
/// names that normalize to the same string are the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Normalize a user-supplied display name.
    ///
    /// Fails with a validation error when nothing usable is left.
    pub fn normalize(raw: &str) -> Result<Self> {
        let mut out = String::with_capacity(raw.len().min(MAX_IDENTITY_LEN));
        let mut pending_separator = false;

        for ch in raw.trim().chars().flat_map(char::to_lowercase) {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                if pending_separator && !out.is_empty() {
                    out.push('-');
                }
                pending_separator = false;
                out.push(ch);
            } else {
                pending_separator = true;
            }
        }

        // Output is pure ASCII, so byte truncation is a char boundary
        out.truncate(MAX_IDENTITY_LEN);
        let trimmed = out.trim_end_matches('-');

        if trimmed.is_empty() {
            return Err(LedgerError::Validation(format!(
                "display name {:?} has no usable characters",
                raw
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The normalized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::normalize(s)
    }
}

impl TryFrom<&str> for Identity {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self> {
        Self::normalize(value)
    }
}
