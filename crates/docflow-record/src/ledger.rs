//! Review ledger
//!
//! One entry per (document, reviewer). Recording a decision upserts the
//! entry; an approval or change request is never recorded twice for the
//! same user.

use crate::document::DocumentId;
use crate::error::RecordError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decision of a single reviewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    #[default]
    Unspecified,
    Approved,
    ChangesRequested,
}

/// Reviewer decision for a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub document_id: DocumentId,
    pub user: String,
    pub status: ReviewStatus,
    pub updated_at: DateTime<Utc>,
}

/// Group whose members were asked to review a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupReviewEntry {
    pub document_id: DocumentId,
    pub group: String,
    pub updated_at: DateTime<Utc>,
}

/// All review decisions for a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLedger {
    document_id: DocumentId,
    entries: Vec<ReviewEntry>,
    groups: Vec<GroupReviewEntry>,
}

impl ReviewLedger {
    #[inline]
    #[must_use]
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            entries: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Rebuild from stored entries
    ///
    /// # Errors
    /// Returns [`RecordError::ForeignReview`] if an entry belongs to another
    /// document.
    pub fn from_entries(
        document_id: DocumentId,
        entries: Vec<ReviewEntry>,
        groups: Vec<GroupReviewEntry>,
    ) -> Result<Self, RecordError> {
        let mut ledger = Self::new(document_id);
        for entry in entries {
            ledger.check_owner(&entry.document_id)?;
            ledger.upsert(&entry.user, entry.status, entry.updated_at);
        }
        for group in groups {
            ledger.check_owner(&group.document_id)?;
            ledger.record_group(&group.group, group.updated_at);
        }
        Ok(ledger)
    }

    fn check_owner(&self, id: &DocumentId) -> Result<(), RecordError> {
        if *id == self.document_id {
            Ok(())
        } else {
            Err(RecordError::ForeignReview {
                document: self.document_id.to_string(),
                entry: id.to_string(),
            })
        }
    }

    #[inline]
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ReviewEntry] {
        &self.entries
    }

    #[inline]
    #[must_use]
    pub fn groups(&self) -> &[GroupReviewEntry] {
        &self.groups
    }

    #[must_use]
    pub fn entry(&self, user: &str) -> Option<&ReviewEntry> {
        self.entries.iter().find(|e| e.user == user)
    }

    #[must_use]
    pub fn status_of(&self, user: &str) -> ReviewStatus {
        self.entry(user).map(|e| e.status).unwrap_or_default()
    }

    /// Record an approval by `user`
    ///
    /// # Errors
    /// Returns [`RecordError::AlreadyApproved`] if `user` already approved.
    pub fn record_approval(
        &mut self,
        user: &str,
        at: DateTime<Utc>,
    ) -> Result<&ReviewEntry, RecordError> {
        if self.status_of(user) == ReviewStatus::Approved {
            return Err(RecordError::AlreadyApproved(user.to_string()));
        }
        Ok(self.upsert(user, ReviewStatus::Approved, at))
    }

    /// Record a change request by `user`
    ///
    /// # Errors
    /// Returns [`RecordError::AlreadyRequestedChanges`] if `user` already
    /// requested changes.
    pub fn record_change_request(
        &mut self,
        user: &str,
        at: DateTime<Utc>,
    ) -> Result<&ReviewEntry, RecordError> {
        if self.status_of(user) == ReviewStatus::ChangesRequested {
            return Err(RecordError::AlreadyRequestedChanges(user.to_string()));
        }
        Ok(self.upsert(user, ReviewStatus::ChangesRequested, at))
    }

    /// Make sure every requested reviewer has an entry, without touching
    /// existing decisions
    pub fn ensure_requested<'a>(
        &mut self,
        users: impl IntoIterator<Item = &'a String>,
        at: DateTime<Utc>,
    ) {
        for user in users {
            if self.entry(user).is_none() {
                self.upsert(user, ReviewStatus::Unspecified, at);
            }
        }
    }

    /// Record that a group was asked to review
    pub fn record_group(&mut self, group: &str, at: DateTime<Utc>) {
        match self.groups.iter_mut().find(|g| g.group == group) {
            Some(existing) => existing.updated_at = at,
            None => self.groups.push(GroupReviewEntry {
                document_id: self.document_id.clone(),
                group: group.to_string(),
                updated_at: at,
            }),
        }
    }

    #[must_use]
    pub fn approved_by(&self) -> Vec<String> {
        self.users_with(ReviewStatus::Approved)
    }

    #[must_use]
    pub fn changes_requested_by(&self) -> Vec<String> {
        self.users_with(ReviewStatus::ChangesRequested)
    }

    fn users_with(&self, status: ReviewStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.user.clone())
            .collect()
    }

    fn upsert(&mut self, user: &str, status: ReviewStatus, at: DateTime<Utc>) -> &ReviewEntry {
        let idx = match self.entries.iter().position(|e| e.user == user) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                entry.status = status;
                entry.updated_at = at;
                idx
            }
            None => {
                self.entries.push(ReviewEntry {
                    document_id: self.document_id.clone(),
                    user: user.to_string(),
                    status,
                    updated_at: at,
                });
                self.entries.len() - 1
            }
        };
        &self.entries[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ReviewLedger {
        ReviewLedger::new(DocumentId::parse("doc").unwrap())
    }

    #[test]
    fn approval_then_change_request_replaces_entry() {
        let mut l = ledger();
        let now = Utc::now();
        l.record_approval("a@x", now).unwrap();
        l.record_change_request("a@x", now).unwrap();
        assert_eq!(l.entries().len(), 1);
        assert_eq!(l.status_of("a@x"), ReviewStatus::ChangesRequested);
        assert!(l.approved_by().is_empty());
    }

    #[test]
    fn duplicate_decisions_are_rejected() {
        let mut l = ledger();
        let now = Utc::now();
        l.record_approval("a@x", now).unwrap();
        assert_eq!(
            l.record_approval("a@x", now).unwrap_err(),
            RecordError::AlreadyApproved("a@x".into())
        );
        l.record_change_request("b@x", now).unwrap();
        assert!(l.record_change_request("b@x", now).is_err());
    }

    #[test]
    fn ensure_requested_keeps_existing_decisions() {
        let mut l = ledger();
        let now = Utc::now();
        l.record_approval("a@x", now).unwrap();
        let users = vec!["a@x".to_string(), "b@x".to_string()];
        l.ensure_requested(&users, now);
        assert_eq!(l.status_of("a@x"), ReviewStatus::Approved);
        assert_eq!(l.status_of("b@x"), ReviewStatus::Unspecified);
    }

    #[test]
    fn foreign_entries_are_rejected() {
        let other = ReviewEntry {
            document_id: DocumentId::parse("other").unwrap(),
            user: "a@x".into(),
            status: ReviewStatus::Approved,
            updated_at: Utc::now(),
        };
        let result =
            ReviewLedger::from_entries(DocumentId::parse("doc").unwrap(), vec![other], vec![]);
        assert!(matches!(result, Err(RecordError::ForeignReview { .. })));
    }
}
