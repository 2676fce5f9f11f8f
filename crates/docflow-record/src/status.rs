//! Document status state machine
//!
//! `WIP -> In-Review -> {Approved, Obsolete}`. `Approved -> In-Review` is
//! only reachable through a change request, and `Obsolete` is terminal.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentStatus {
    /// Private draft
    #[serde(rename = "WIP")]
    Wip,
    /// Published and awaiting approvals
    #[serde(rename = "In-Review", alias = "In Review")]
    InReview,
    /// Approved by reviewers
    Approved,
    /// Retired
    Obsolete,
}

impl DocumentStatus {
    /// Every status, in lifecycle order
    pub const ALL: [DocumentStatus; 4] = [
        DocumentStatus::Wip,
        DocumentStatus::InReview,
        DocumentStatus::Approved,
        DocumentStatus::Obsolete,
    ];

    /// Statuses a document patch may set
    pub const PATCH_TARGETS: [DocumentStatus; 3] = [
        DocumentStatus::Approved,
        DocumentStatus::InReview,
        DocumentStatus::Obsolete,
    ];

    /// Canonical string form, as stored in the search index
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wip => "WIP",
            Self::InReview => "In-Review",
            Self::Approved => "Approved",
            Self::Obsolete => "Obsolete",
        }
    }

    /// Whether no transition leaves this status
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }

    /// Whether approvals and change requests are accepted in this status
    #[inline]
    #[must_use]
    pub fn accepts_reviews(self) -> bool {
        matches!(self, Self::InReview | Self::Approved)
    }

    /// Parse a status requested through a document patch
    ///
    /// # Errors
    /// Returns [`RecordError::UnknownStatus`] for unknown strings and
    /// [`RecordError::InvalidPatchTarget`] for `WIP`.
    pub fn parse_patch_target(raw: &str) -> Result<Self, RecordError> {
        let status: Self = raw.parse()?;
        if Self::PATCH_TARGETS.contains(&status) {
            Ok(status)
        } else {
            Err(RecordError::InvalidPatchTarget(status))
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WIP" => Ok(Self::Wip),
            // "In Review" is a legacy display variant found in older index objects.
            "In-Review" | "In Review" => Ok(Self::InReview),
            "Approved" => Ok(Self::Approved),
            "Obsolete" => Ok(Self::Obsolete),
            other => Err(RecordError::UnknownStatus(other.to_string())),
        }
    }
}

/// Statuses reachable from `from` in a single step
#[must_use]
pub fn allowed_transitions(from: DocumentStatus) -> &'static [DocumentStatus] {
    use DocumentStatus::*;
    match from {
        Wip => &[InReview],
        InReview => &[Approved, Obsolete],
        Approved => &[InReview, Obsolete],
        Obsolete => &[],
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`RecordError::IllegalTransition`] if `to` is not reachable from
/// `from` in one step.
pub fn validate_transition(from: DocumentStatus, to: DocumentStatus) -> Result<(), RecordError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RecordError::IllegalTransition { from, to })
    }
}
