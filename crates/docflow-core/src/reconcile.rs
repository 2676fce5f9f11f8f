//! Consistency reconciler
//!
//! Compares the search index's object for a document with the datastore's
//! snapshot and accumulates every field-level difference. The result is
//! advisory: it is logged, never returned to a caller as an error, and
//! neither system is modified.
//!
//! A key missing from the index object compares as its empty value, the
//! way the projection in [`DocumentRecord::to_search_object`] omits empty
//! fields.
//!
//! [`DocumentRecord::to_search_object`]: docflow_record::DocumentRecord::to_search_object

use docflow_record::{
    find_doc_type, index_number_matches, CustomFieldType, DocumentId, DocumentSnapshot,
    DocumentStatus, DocumentTypeDef, SearchObject,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One difference between the index and the datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Values differ
    Mismatch {
        field: String,
        index: String,
        datastore: String,
    },
    /// Index value has the wrong JSON type
    InvalidIndexValue { field: String, message: String },
    /// Index names a document type missing from configuration
    UnknownDocType { doc_type: String },
}

impl Discrepancy {
    /// Field the discrepancy is about
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Mismatch { field, .. } | Self::InvalidIndexValue { field, .. } => field,
            Self::UnknownDocType { .. } => "docType",
        }
    }

    fn mismatch(field: &str, index: impl fmt::Debug, datastore: impl fmt::Debug) -> Self {
        Self::Mismatch {
            field: field.to_string(),
            index: format!("{index:?}"),
            datastore: format!("{datastore:?}"),
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch {
                field,
                index,
                datastore,
            } => write!(f, "{field} not equal, index={index}, datastore={datastore}"),
            Self::InvalidIndexValue { field, message } => {
                write!(f, "invalid index value for {field}: {message}")
            }
            Self::UnknownDocType { doc_type } => write!(f, "doc type {doc_type:?} not found"),
        }
    }
}

/// Outcome of reconciling one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub document_id: DocumentId,
    pub discrepancies: Vec<Discrepancy>,
}

impl ConsistencyReport {
    #[inline]
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Log discrepancies as a single warning
    pub fn log(&self) {
        if self.is_consistent() {
            tracing::debug!(doc_id = %self.document_id, "index and datastore agree");
            return;
        }
        let details: Vec<String> = self.discrepancies.iter().map(ToString::to_string).collect();
        tracing::warn!(
            doc_id = %self.document_id,
            count = details.len(),
            discrepancies = ?details,
            "search index and datastore have diverged"
        );
    }
}

/// Compare an index object against a datastore snapshot
#[must_use]
pub fn reconcile(
    index: &SearchObject,
    snapshot: &DocumentSnapshot,
    doc_types: &[DocumentTypeDef],
) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    let row = &snapshot.row;
    let mut fields = Fields {
        index,
        out: &mut out,
    };

    if let Some(id) = fields.string("objectID") {
        if id != row.id.as_str() {
            fields.push(Discrepancy::mismatch("objectID", id, row.id.as_str()));
        }
    }
    fields.compare_string("title", &row.title);

    let index_doc_type = fields.string("docType").unwrap_or_default();
    if index_doc_type != row.doc_type {
        fields.push(Discrepancy::mismatch("docType", &index_doc_type, &row.doc_type));
    }

    if let Some(number) = fields.string("docNumber") {
        if !index_number_matches(&number, &snapshot.product.abbreviation, row.document_number) {
            fields.push(Discrepancy::mismatch(
                "docNumber",
                number,
                format!("{}-{:03}", snapshot.product.abbreviation, row.document_number),
            ));
        }
    }

    if let Some(app_created) = fields.boolean("appCreated") {
        if app_created == row.imported {
            fields.push(Discrepancy::mismatch("appCreated", app_created, !row.imported));
        }
    }

    let approved_by: Vec<String> = snapshot
        .ledger
        .approved_by()
        .into_iter()
        .filter(|u| row.approvers.contains(u))
        .collect();
    let changes_requested_by: Vec<String> = snapshot
        .ledger
        .changes_requested_by()
        .into_iter()
        .filter(|u| row.approvers.contains(u))
        .collect();
    fields.compare_set("approvedBy", &approved_by);
    fields.compare_set("approvers", &row.approvers);
    fields.compare_set("changesRequestedBy", &changes_requested_by);
    fields.compare_set("contributors", &row.contributors);

    fields.compare_time("createdTime", row.created_at.timestamp());
    fields.compare_time("modifiedTime", row.modified_at.timestamp());

    match find_doc_type(doc_types, &index_doc_type) {
        Some(doc_type) => fields.compare_custom_fields(doc_type, snapshot),
        None => fields.push(Discrepancy::UnknownDocType {
            doc_type: index_doc_type,
        }),
    }

    if let Some(revisions) = fields.string_map("fileRevisions") {
        let stored: BTreeMap<String, String> = snapshot
            .file_revisions
            .iter()
            .map(|r| (r.revision_id.clone(), r.label.clone()))
            .collect();
        if revisions != stored {
            fields.push(Discrepancy::mismatch("fileRevisions", revisions, stored));
        }
    }

    // Only the first owner is compared; the index may list several.
    if let Some(owners) = fields.strings("owners") {
        let index_owner = owners.first().cloned().unwrap_or_default();
        let stored_owner = row.owner.clone().unwrap_or_default();
        if index_owner != stored_owner {
            fields.push(Discrepancy::mismatch("owners", index_owner, stored_owner));
        }
    }

    fields.compare_string("product", &snapshot.product.name);

    if let Some(status) = fields.string("status") {
        let normalized = status.parse::<DocumentStatus>().ok();
        if normalized != Some(row.status) {
            fields.push(Discrepancy::mismatch("status", status, row.status.as_str()));
        }
    }

    if let Some(stored) = &row.summary {
        fields.compare_string("summary", stored);
    }

    out
}

struct Fields<'a> {
    index: &'a SearchObject,
    out: &'a mut Vec<Discrepancy>,
}

impl Fields<'_> {
    fn push(&mut self, discrepancy: Discrepancy) {
        self.out.push(discrepancy);
    }

    fn invalid(&mut self, field: &str, message: &str) {
        self.push(Discrepancy::InvalidIndexValue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    fn string(&mut self, key: &str) -> Option<String> {
        match self.index.get(key) {
            None | Some(Value::Null) => Some(String::new()),
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                self.invalid(key, "value is not a string");
                None
            }
        }
    }

    fn boolean(&mut self, key: &str) -> Option<bool> {
        match self.index.get(key) {
            None | Some(Value::Null) => Some(false),
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.invalid(key, "value is not a boolean");
                None
            }
        }
    }

    fn integer(&mut self, key: &str) -> Option<i64> {
        match self.index.get(key) {
            None | Some(Value::Null) => Some(0),
            #[allow(clippy::cast_possible_truncation)]
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(_) => {
                self.invalid(key, "value is not a number");
                None
            }
        }
    }

    fn strings(&mut self, key: &str) -> Option<Vec<String>> {
        match self.index.get(key) {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(Value::Array(items)) => {
                let strings: Option<Vec<String>> =
                    items.iter().map(|v| v.as_str().map(str::to_string)).collect();
                if strings.is_none() {
                    self.invalid(key, "array element is not a string");
                }
                strings
            }
            Some(_) => {
                self.invalid(key, "value is not an array");
                None
            }
        }
    }

    fn string_map(&mut self, key: &str) -> Option<BTreeMap<String, String>> {
        match self.index.get(key) {
            None | Some(Value::Null) => Some(BTreeMap::new()),
            Some(Value::Object(map)) => {
                let entries: Option<BTreeMap<String, String>> = map
                    .iter()
                    .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect();
                if entries.is_none() {
                    self.invalid(key, "map value is not a string");
                }
                entries
            }
            Some(_) => {
                self.invalid(key, "value is not an object");
                None
            }
        }
    }

    fn compare_string(&mut self, key: &str, stored: &str) {
        if let Some(value) = self.string(key) {
            if value != stored {
                self.push(Discrepancy::mismatch(key, value, stored));
            }
        }
    }

    fn compare_set(&mut self, key: &str, stored: &[String]) {
        if let Some(values) = self.strings(key) {
            if !same_elements(&values, stored) {
                self.push(Discrepancy::mismatch(key, values, stored));
            }
        }
    }

    fn compare_time(&mut self, key: &str, stored: i64) {
        if let Some(value) = self.integer(key) {
            if value != stored {
                self.push(Discrepancy::mismatch(key, value, stored));
            }
        }
    }

    fn compare_custom_fields(&mut self, doc_type: &DocumentTypeDef, snapshot: &DocumentSnapshot) {
        for def in &doc_type.custom_fields {
            let key = def.key();
            let persisted = snapshot
                .row
                .custom_fields
                .iter()
                .find(|cf| cf.display_name == def.name);
            match def.field_type {
                CustomFieldType::String => {
                    let stored = persisted.map(|cf| cf.value.as_str()).unwrap_or_default();
                    self.compare_string(&key, stored);
                }
                CustomFieldType::People => {
                    let stored: Vec<String> = match persisted {
                        Some(cf) => match serde_json::from_str(&cf.value) {
                            Ok(people) => people,
                            Err(_) => {
                                self.push(Discrepancy::Mismatch {
                                    field: key.clone(),
                                    index: String::new(),
                                    datastore: format!("undecodable value {:?}", cf.value),
                                });
                                continue;
                            }
                        },
                        None => Vec::new(),
                    };
                    self.compare_set(&key, &stored);
                }
            }
        }
    }
}

/// Multiset equality, ignoring order
fn same_elements(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use docflow_record::{
        CustomField, CustomFieldDef, DocNumber, DocumentRecord, DocumentRow, FileRevision,
        Product, ReviewLedger,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rfc() -> DocumentTypeDef {
        DocumentTypeDef::new("RFC")
            .with_field(CustomFieldDef::new("Current Version", CustomFieldType::String))
            .with_field(CustomFieldDef::new("Stakeholders", CustomFieldType::People))
    }

    fn snapshot() -> (DocumentRecord, DocumentSnapshot) {
        let product = Product::new("Terraform", "TF");
        let mut record = DocumentRecord::draft(
            DocumentId::parse("d1").unwrap(),
            "New",
            "RFC",
            &product,
            "o@x.com",
        );
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        record.status = DocumentStatus::InReview;
        record.doc_number = DocNumber::assigned("TF", 7);
        record.approvers = vec!["a@x.com".into(), "b@x.com".into()];
        record.summary = "Short".into();
        record.modified_time = at.timestamp();
        let defs = rfc();
        record
            .upsert_custom_field(CustomField::text(&defs.custom_fields[0], "1.0"))
            .unwrap();
        record
            .upsert_custom_field(CustomField::people(
                &defs.custom_fields[1],
                vec!["s@x.com".into(), "t@x.com".into()],
            ))
            .unwrap();

        let mut ledger = ReviewLedger::new(record.id.clone());
        ledger.record_approval("a@x.com", at).unwrap();
        let row = DocumentRow::from_record(&record, at);
        let snapshot = DocumentSnapshot {
            row,
            product,
            ledger,
            file_revisions: vec![FileRevision {
                document_id: record.id.clone(),
                revision_id: "r1".into(),
                label: "Requested review".into(),
            }],
        };
        let rebuilt = DocumentRecord::from_snapshot(&snapshot, &[rfc()]).unwrap();
        (rebuilt, snapshot)
    }

    #[test]
    fn identical_representations_agree() {
        let (record, snapshot) = snapshot();
        let index = record.to_search_object();
        assert_eq!(reconcile(&index, &snapshot, &[rfc()]), vec![]);
    }

    #[test]
    fn single_changed_title_yields_one_discrepancy() {
        let (record, snapshot) = snapshot();
        let mut index = record.to_search_object();
        index.insert("title".into(), json!("Old"));
        index.insert("status".into(), json!("In Review"));

        let found = reconcile(&index, &snapshot, &[rfc()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].field(), "title");
    }

    #[test]
    fn sets_ignore_order_and_numbers_accept_legacy_form() {
        let (record, snapshot) = snapshot();
        let mut index = record.to_search_object();
        index.insert("approvers".into(), json!(["b@x.com", "a@x.com"]));
        index.insert("stakeholders".into(), json!(["t@x.com", "s@x.com"]));
        index.insert("docNumber".into(), json!("TF-7"));
        assert!(reconcile(&index, &snapshot, &[rfc()]).is_empty());
    }

    #[test]
    fn every_difference_is_accumulated() {
        let (record, snapshot) = snapshot();
        let mut index = record.to_search_object();
        index.insert("product".into(), json!("Vault"));
        index.insert("owners".into(), json!(["other@x.com", "o@x.com"]));
        index.insert("currentVersion".into(), json!("2.0"));
        index.insert("createdTime".into(), json!(1.0));
        index.insert("fileRevisions".into(), json!({}));

        let fields: Vec<String> = reconcile(&index, &snapshot, &[rfc()])
            .iter()
            .map(|d| d.field().to_string())
            .collect();
        assert_eq!(
            fields,
            vec!["createdTime", "currentVersion", "fileRevisions", "owners", "product"]
        );
    }

    #[test]
    fn wrong_types_and_unknown_doc_type_are_reported() {
        let (record, snapshot) = snapshot();
        let mut index = record.to_search_object();
        index.insert("approvers".into(), json!("a@x.com"));
        let found = reconcile(&index, &snapshot, &[rfc()]);
        assert!(matches!(&found[0], Discrepancy::InvalidIndexValue { field, .. } if field == "approvers"));

        let found = reconcile(&record.to_search_object(), &snapshot, &[]);
        assert_eq!(
            found,
            vec![Discrepancy::UnknownDocType {
                doc_type: "RFC".into()
            }]
        );
    }

    #[test]
    fn draft_placeholder_matches_unassigned_number() {
        let (mut record, mut snapshot) = snapshot();
        record.doc_number = DocNumber::unassigned("TF");
        snapshot.row.document_number = 0;
        assert!(reconcile(&record.to_search_object(), &snapshot, &[rfc()]).is_empty());
    }

    #[test]
    fn report_logs_without_panicking() {
        let report = ConsistencyReport {
            document_id: DocumentId::parse("d1").unwrap(),
            discrepancies: vec![Discrepancy::mismatch("title", "Old", "New")],
        };
        assert!(!report.is_consistent());
        report.log();
        assert_eq!(
            report.discrepancies[0].to_string(),
            r#"title not equal, index="Old", datastore="New""#
        );
    }
}
