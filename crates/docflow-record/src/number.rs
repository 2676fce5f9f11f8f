//! Human-facing document numbers
//!
//! A document number is `{ABBR}-{NNN}` once assigned and `{ABBR}-???`
//! while the document is a draft. Sequences are zero-padded to three
//! digits; older records may carry unpadded numbers.

use crate::error::RecordError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static DOC_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<abbr>.+)-(?P<seq>\?\?\?|\d+)$").unwrap());

/// Placeholder suffix of a draft document number
pub const UNASSIGNED_SUFFIX: &str = "???";

/// Document number as shown in headers, file names and the search index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocNumber {
    abbreviation: String,
    sequence: Option<u32>,
}

impl DocNumber {
    /// Draft placeholder for a product
    #[inline]
    #[must_use]
    pub fn unassigned(abbreviation: impl Into<String>) -> Self {
        Self {
            abbreviation: abbreviation.into(),
            sequence: None,
        }
    }

    /// Assigned number
    #[inline]
    #[must_use]
    pub fn assigned(abbreviation: impl Into<String>, sequence: u32) -> Self {
        Self {
            abbreviation: abbreviation.into(),
            sequence: Some(sequence),
        }
    }

    /// Number following the latest assigned sequence for a product
    #[inline]
    #[must_use]
    pub fn next_after(abbreviation: impl Into<String>, latest: u32) -> Self {
        Self::assigned(abbreviation, latest.saturating_add(1))
    }

    /// Build from a persisted sequence, where `0` means unassigned
    #[inline]
    #[must_use]
    pub fn from_persisted(abbreviation: impl Into<String>, sequence: u32) -> Self {
        if sequence == 0 {
            Self::unassigned(abbreviation)
        } else {
            Self::assigned(abbreviation, sequence)
        }
    }

    #[inline]
    #[must_use]
    pub fn abbreviation(&self) -> &str {
        &self.abbreviation
    }

    #[inline]
    #[must_use]
    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    /// Sequence as persisted, `0` for unassigned
    #[inline]
    #[must_use]
    pub fn persisted_sequence(&self) -> u32 {
        self.sequence.unwrap_or(0)
    }

    #[inline]
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.sequence.is_some()
    }
}

impl fmt::Display for DocNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sequence {
            Some(seq) => write!(f, "{}-{seq:03}", self.abbreviation),
            None => write!(f, "{}-{UNASSIGNED_SUFFIX}", self.abbreviation),
        }
    }
}

impl FromStr for DocNumber {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DOC_NUMBER_RE
            .captures(s)
            .ok_or_else(|| RecordError::InvalidDocNumber(s.to_string()))?;
        let abbreviation = caps["abbr"].to_string();
        match &caps["seq"] {
            UNASSIGNED_SUFFIX => Ok(Self::unassigned(abbreviation)),
            digits => digits
                .parse::<u32>()
                .map(|seq| Self::from_persisted(abbreviation, seq))
                .map_err(|_| RecordError::InvalidDocNumber(s.to_string())),
        }
    }
}

impl TryFrom<String> for DocNumber {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocNumber> for String {
    fn from(value: DocNumber) -> Self {
        value.to_string()
    }
}

/// Normalize an index document number for comparison: `-???` becomes `-000`
#[must_use]
pub fn normalize_index_number(raw: &str) -> String {
    match raw.strip_suffix(UNASSIGNED_SUFFIX) {
        Some(prefix) if prefix.ends_with('-') => format!("{prefix}000"),
        _ => raw.to_string(),
    }
}

/// Whether an index document number agrees with a persisted one
///
/// An empty index value is never a mismatch. Otherwise the padded form is
/// tried first, then the legacy unpadded form.
#[must_use]
pub fn index_number_matches(index_value: &str, abbreviation: &str, sequence: u32) -> bool {
    if index_value.is_empty() {
        return true;
    }
    let normalized = normalize_index_number(index_value);
    normalized == format!("{abbreviation}-{sequence:03}")
        || normalized == format!("{abbreviation}-{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_padded_and_placeholder() {
        assert_eq!(DocNumber::assigned("TST", 1).to_string(), "TST-001");
        assert_eq!(DocNumber::assigned("TST", 1234).to_string(), "TST-1234");
        assert_eq!(DocNumber::unassigned("TST").to_string(), "TST-???");
    }

    #[test]
    fn parses_all_forms() {
        assert_eq!("TST-???".parse::<DocNumber>().unwrap(), DocNumber::unassigned("TST"));
        assert_eq!("TST-007".parse::<DocNumber>().unwrap(), DocNumber::assigned("TST", 7));
        assert_eq!("TST-7".parse::<DocNumber>().unwrap(), DocNumber::assigned("TST", 7));
        assert_eq!("LAB-X-012".parse::<DocNumber>().unwrap(), DocNumber::assigned("LAB-X", 12));
        assert!("TST".parse::<DocNumber>().is_err());
        assert!("TST-abc".parse::<DocNumber>().is_err());
    }

    #[test]
    fn next_after_increments() {
        assert_eq!(DocNumber::next_after("TST", 41).to_string(), "TST-042");
        assert_eq!(DocNumber::next_after("TST", 0).to_string(), "TST-001");
    }

    #[test]
    fn index_comparison_accepts_placeholder_and_legacy() {
        assert!(index_number_matches("TST-???", "TST", 0));
        assert!(index_number_matches("TST-005", "TST", 5));
        assert!(index_number_matches("TST-5", "TST", 5));
        assert!(!index_number_matches("TST-006", "TST", 5));
        assert!(index_number_matches("", "TST", 5));
    }

    #[test]
    fn serde_uses_display_form() {
        let json = serde_json::to_string(&DocNumber::assigned("ABC", 3)).unwrap();
        assert_eq!(json, "\"ABC-003\"");
        let parsed: DocNumber = serde_json::from_str("\"ABC-???\"").unwrap();
        assert!(!parsed.is_assigned());
    }
}
