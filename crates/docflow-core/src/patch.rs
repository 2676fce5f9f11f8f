//! Patch & authorization engine
//!
//! A patch is sparse: every field is optional and only present fields are
//! applied. Handling a patch is split into pure stages so nothing is
//! mutated until the whole request is known to be acceptable:
//!
//! 1. authorize the caller against the current record
//! 2. validate field shapes against configuration
//! 3. diff requested sets against current sets (before merging)
//! 4. merge into both the record and its persisted row

use crate::error::{AuthorizationKind, ConflictKind, WorkflowError};
use chrono::{DateTime, Utc};
use docflow_record::{
    upsert_persisted, validate_transition, CustomField, DocNumber, DocumentRecord, DocumentRow,
    DocumentStatus, DocumentTypeDef, Product,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Patch of a published document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentPatch {
    pub approvers: Option<Vec<String>>,
    pub approver_groups: Option<Vec<String>>,
    pub contributors: Option<Vec<String>>,
    pub custom_fields: Option<Vec<CustomField>>,
    pub owners: Option<Vec<String>>,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub title: Option<String>,
}

impl DocumentPatch {
    /// Number of fields present
    #[must_use]
    pub fn field_count(&self) -> usize {
        [
            self.approvers.is_some(),
            self.approver_groups.is_some(),
            self.contributors.is_some(),
            self.custom_fields.is_some(),
            self.owners.is_some(),
            self.status.is_some(),
            self.summary.is_some(),
            self.title.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

/// Patch of a draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DraftPatch {
    pub approvers: Option<Vec<String>>,
    pub approver_groups: Option<Vec<String>>,
    pub contributors: Option<Vec<String>>,
    pub custom_fields: Option<Vec<CustomField>>,
    pub owners: Option<Vec<String>>,
    pub product: Option<String>,
    pub summary: Option<String>,
    pub title: Option<String>,
}

/// Request to author a new draft
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NewDraft {
    pub title: String,
    pub doc_type: String,
    pub product: String,
    pub contributors: Vec<String>,
    pub custom_fields: Vec<CustomField>,
    pub summary: String,
}

/// Check a new draft against the configured document types
///
/// The product is resolved separately, inside the datastore transaction.
///
/// # Errors
/// Returns a validation error for a blank title or product, an unknown
/// document type or a custom field the type does not declare.
pub fn validate_new_draft<'a>(
    request: &NewDraft,
    doc_types: &'a [DocumentTypeDef],
) -> Result<&'a DocumentTypeDef, WorkflowError> {
    if request.title.trim().is_empty() {
        return Err(WorkflowError::Validation("title is required".to_string()));
    }
    let doc_type = doc_types
        .iter()
        .find(|def| def.name == request.doc_type)
        .ok_or_else(|| WorkflowError::Validation("invalid document type".to_string()))?;
    if request.product.trim().is_empty() {
        return Err(WorkflowError::Validation("product is required".to_string()));
    }
    validate_custom_fields(doc_type, &request.custom_fields)?;
    Ok(doc_type)
}

/// Role under which a document patch was authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchActor {
    Owner,
    /// Approver removing only themselves from `approvers`
    SelfRemovingApprover,
}

/// Authorize a document patch
///
/// The owner may patch anything. A current approver may send a patch with
/// only `approvers`, holding the current approvers minus themselves.
///
/// # Errors
/// Returns [`AuthorizationKind::PatchForbidden`] for every other shape.
pub fn authorize_document_patch(
    user: &str,
    record: &DocumentRecord,
    patch: &DocumentPatch,
) -> Result<PatchActor, WorkflowError> {
    if record.is_owner(user) {
        return Ok(PatchActor::Owner);
    }
    let forbidden = || WorkflowError::authorization(AuthorizationKind::PatchForbidden);

    if !record.is_approver(user) || patch.field_count() != 1 {
        return Err(forbidden());
    }
    let requested = patch.approvers.as_deref().ok_or_else(forbidden)?;
    let requested = dedup(requested);
    let current: HashSet<&str> = record.approvers.iter().map(String::as_str).collect();

    let removes_only_self = requested.len() + 1 == current.len()
        && requested.iter().all(|a| current.contains(a.as_str()))
        && !requested.iter().any(|a| a == user);
    if removes_only_self {
        Ok(PatchActor::SelfRemovingApprover)
    } else {
        Err(forbidden())
    }
}

/// Authorize a draft patch or delete: owner only
///
/// # Errors
/// Returns [`AuthorizationKind::NotOwner`] for anyone but the owner.
pub fn authorize_draft_owner(user: &str, record: &DocumentRecord) -> Result<(), WorkflowError> {
    if record.is_owner(user) {
        Ok(())
    } else {
        Err(WorkflowError::authorization(AuthorizationKind::NotOwner))
    }
}

/// Single-owner invariant
///
/// # Errors
/// Returns a validation error unless exactly one non-empty owner is given.
pub fn validate_owners(owners: &[String]) -> Result<&str, WorkflowError> {
    match owners {
        [owner] if !owner.trim().is_empty() => Ok(owner),
        _ => Err(WorkflowError::Validation(
            "owners must contain exactly one email".to_string(),
        )),
    }
}

/// Check every submitted custom field against the document type
///
/// # Errors
/// Returns a validation error for undeclared or mismatched fields.
pub fn validate_custom_fields(
    doc_type: &DocumentTypeDef,
    fields: &[CustomField],
) -> Result<(), WorkflowError> {
    for field in fields {
        doc_type.validate(field)?;
    }
    Ok(())
}

/// Parse a requested status and check the transition from `current`
///
/// `Approved -> In-Review` is refused here; only a change request reopens
/// review.
///
/// # Errors
/// Returns a validation error for unknown or `WIP` targets and a conflict
/// for transitions the state machine rejects.
pub fn validate_status(
    current: DocumentStatus,
    requested: &str,
) -> Result<Option<DocumentStatus>, WorkflowError> {
    let target = DocumentStatus::parse_patch_target(requested)?;
    if target == current {
        return Ok(None);
    }
    if current == DocumentStatus::Approved && target == DocumentStatus::InReview {
        return Err(WorkflowError::conflict(ConflictKind::IllegalTransition));
    }
    validate_transition(current, target)?;
    Ok(Some(target))
}

/// Members of `requested` missing from `current`
///
/// When `current` is empty the whole requested set is new.
#[must_use]
pub fn newly_added(current: &[String], requested: &[String]) -> Vec<String> {
    let requested = dedup(requested);
    if current.is_empty() {
        return requested;
    }
    requested
        .into_iter()
        .filter(|r| !current.contains(r))
        .collect()
}

/// Members of `current` missing from `requested`
#[must_use]
pub fn removed(current: &[String], requested: &[String]) -> Vec<String> {
    current
        .iter()
        .filter(|c| !requested.contains(c))
        .cloned()
        .collect()
}

fn dedup(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

/// Validated patch, ready to merge
///
/// Diffs are computed against the record the plan was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchPlan {
    approvers: Option<Vec<String>>,
    approver_groups: Option<Vec<String>>,
    contributors: Option<Vec<String>>,
    custom_fields: Vec<CustomField>,
    owner: Option<String>,
    status: Option<DocumentStatus>,
    summary: Option<String>,
    title: Option<String>,
    product: Option<Product>,

    /// Owner that differs from the current one
    pub new_owner: Option<String>,
    pub new_approvers: Vec<String>,
    pub new_approver_groups: Vec<String>,
    pub added_contributors: Vec<String>,
    pub removed_contributors: Vec<String>,
}

impl PatchPlan {
    /// Validate a document patch (authorization is checked separately)
    ///
    /// # Errors
    /// Returns the first validation or transition error.
    pub fn for_document(
        record: &DocumentRecord,
        doc_type: &DocumentTypeDef,
        patch: DocumentPatch,
    ) -> Result<Self, WorkflowError> {
        let mut plan = Self::common(
            record,
            doc_type,
            patch.owners.as_deref(),
            patch.custom_fields,
        )?;
        if let Some(status) = patch.status.as_deref() {
            plan.status = validate_status(record.status, status)?;
        }
        plan.set_people(record, patch.approvers, patch.approver_groups, patch.contributors);
        plan.summary = patch.summary;
        plan.title = patch.title;
        Ok(plan)
    }

    /// Validate a draft patch; `product` is the resolved product, if one was requested
    ///
    /// # Errors
    /// Returns the first validation error.
    pub fn for_draft(
        record: &DocumentRecord,
        doc_type: &DocumentTypeDef,
        patch: DraftPatch,
        product: Option<Product>,
    ) -> Result<Self, WorkflowError> {
        let mut plan = Self::common(
            record,
            doc_type,
            patch.owners.as_deref(),
            patch.custom_fields,
        )?;
        plan.set_people(record, patch.approvers, patch.approver_groups, patch.contributors);
        plan.summary = patch.summary;
        plan.title = patch.title;
        plan.product = product;
        Ok(plan)
    }

    fn common(
        record: &DocumentRecord,
        doc_type: &DocumentTypeDef,
        owners: Option<&[String]>,
        custom_fields: Option<Vec<CustomField>>,
    ) -> Result<Self, WorkflowError> {
        let mut plan = Self::default();
        if let Some(owners) = owners {
            let owner = validate_owners(owners)?.to_string();
            if !record.is_owner(&owner) {
                plan.new_owner = Some(owner.clone());
            }
            plan.owner = Some(owner);
        }
        if let Some(fields) = custom_fields {
            validate_custom_fields(doc_type, &fields)?;
            plan.custom_fields = fields;
        }
        Ok(plan)
    }

    fn set_people(
        &mut self,
        record: &DocumentRecord,
        approvers: Option<Vec<String>>,
        approver_groups: Option<Vec<String>>,
        contributors: Option<Vec<String>>,
    ) {
        if let Some(approvers) = approvers {
            self.new_approvers = newly_added(&record.approvers, &approvers);
            self.approvers = Some(dedup(&approvers));
        }
        if let Some(groups) = approver_groups {
            self.new_approver_groups = newly_added(&record.approver_groups, &groups);
            self.approver_groups = Some(dedup(&groups));
        }
        if let Some(contributors) = contributors {
            self.added_contributors = newly_added(&record.contributors, &contributors);
            self.removed_contributors = removed(&record.contributors, &contributors);
            self.contributors = Some(dedup(&contributors));
        }
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<DocumentStatus> {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn product(&self) -> Option<&Product> {
        self.product.as_ref()
    }

    /// Merge into the record and its row
    ///
    /// # Errors
    /// Returns an error if a custom field clashes with the record's
    /// existing field of the same key.
    pub fn apply(
        &self,
        record: &mut DocumentRecord,
        row: &mut DocumentRow,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if let Some(approvers) = &self.approvers {
            record.approvers.clone_from(approvers);
            row.approvers.clone_from(approvers);
            record.approved_by.retain(|a| approvers.contains(a));
            record.changes_requested_by.retain(|a| approvers.contains(a));
        }
        if let Some(groups) = &self.approver_groups {
            record.approver_groups.clone_from(groups);
            row.approver_groups.clone_from(groups);
        }
        if let Some(contributors) = &self.contributors {
            record.contributors.clone_from(contributors);
            row.contributors.clone_from(contributors);
        }
        for field in &self.custom_fields {
            record.upsert_custom_field(field.clone())?;
            upsert_persisted(
                &mut row.custom_fields,
                &record.doc_type,
                &field.display_name,
                &field.value,
            );
        }
        if let Some(owner) = &self.owner {
            record.owners = vec![owner.clone()];
            row.owner = Some(owner.clone());
        }
        if let Some(status) = self.status {
            record.status = status;
            row.status = status;
        }
        if let Some(summary) = &self.summary {
            record.summary.clone_from(summary);
            row.summary = Some(summary.clone());
        }
        if let Some(title) = &self.title {
            record.title.clone_from(title);
            row.title.clone_from(title);
        }
        if let Some(product) = &self.product {
            record.product.clone_from(&product.name);
            record.doc_number = DocNumber::unassigned(product.abbreviation.clone());
            row.product.clone_from(&product.name);
            row.document_number = 0;
        }
        record.modified_time = now.timestamp();
        row.modified_at = now;
        Ok(())
    }
}
