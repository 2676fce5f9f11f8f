//! Custom fields and document type definitions
//!
//! Each document type declares a set of editable custom fields. A field is
//! either free text (`STRING`) or a list of user emails (`PEOPLE`). Fields
//! are addressed by a lower-camel key derived from their declared name.

use crate::error::RecordError;
use serde::{Deserialize, Serialize};

/// Declared type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomFieldType {
    #[serde(rename = "STRING", alias = "string")]
    String,
    #[serde(rename = "PEOPLE", alias = "people")]
    People,
}

impl CustomFieldType {
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::People => "PEOPLE",
        }
    }
}

/// Value carried by a custom field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CustomFieldValue {
    Text(String),
    People(Vec<String>),
}

impl CustomFieldValue {
    /// Type implied by the value's shape
    #[inline]
    #[must_use]
    pub fn field_type(&self) -> CustomFieldType {
        match self {
            Self::Text(_) => CustomFieldType::String,
            Self::People(_) => CustomFieldType::People,
        }
    }

    /// An empty value removes the field from a document
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::People(p) => p.is_empty(),
        }
    }

    /// People listed in a `PEOPLE` value
    #[must_use]
    pub fn people(&self) -> &[String] {
        match self {
            Self::People(p) => p,
            Self::Text(_) => &[],
        }
    }
}

/// Custom field with a value, as carried on a document record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
    pub value: CustomFieldValue,
}

impl CustomField {
    #[must_use]
    pub fn text(def: &CustomFieldDef, value: impl Into<String>) -> Self {
        Self {
            name: def.key(),
            display_name: def.name.clone(),
            field_type: CustomFieldType::String,
            value: CustomFieldValue::Text(value.into()),
        }
    }

    #[must_use]
    pub fn people(def: &CustomFieldDef, people: Vec<String>) -> Self {
        Self {
            name: def.key(),
            display_name: def.name.clone(),
            field_type: CustomFieldType::People,
            value: CustomFieldValue::People(people),
        }
    }
}

/// Custom field declared by a document type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    /// Display name, e.g. `Current Version`
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
}

impl CustomFieldDef {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: CustomFieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Key used on records and in the search index
    #[must_use]
    pub fn key(&self) -> String {
        lower_camel(&self.name)
    }

    /// Checks a submitted field against this declaration
    ///
    /// # Errors
    /// Returns an error when the display name, declared type, or value
    /// shape does not match.
    pub fn check(&self, field: &CustomField) -> Result<(), RecordError> {
        if field.display_name != self.name {
            return Err(RecordError::CustomFieldDisplayName {
                field: field.name.clone(),
                expected: self.name.clone(),
                actual: field.display_name.clone(),
            });
        }
        if field.field_type != self.field_type {
            return Err(RecordError::CustomFieldType(field.name.clone()));
        }
        if field.value.field_type() != self.field_type {
            return Err(RecordError::CustomFieldValue(field.name.clone()));
        }
        Ok(())
    }
}

/// Document type with its editable custom fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeDef {
    pub name: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldDef>,
    /// Storage file new drafts are copied from; drafts start empty without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl DocumentTypeDef {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            long_name: String::new(),
            custom_fields: Vec::new(),
            template: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = long_name.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, def: CustomFieldDef) -> Self {
        self.custom_fields.push(def);
        self
    }

    /// Declaration whose key matches `key`
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&CustomFieldDef> {
        self.custom_fields.iter().find(|def| def.key() == key)
    }

    /// Declaration whose display name matches `display_name`
    #[must_use]
    pub fn field_by_display_name(&self, display_name: &str) -> Option<&CustomFieldDef> {
        self.custom_fields.iter().find(|def| def.name == display_name)
    }

    /// Validates a submitted custom field for this document type
    ///
    /// # Errors
    /// Returns [`RecordError::UnknownCustomField`] for undeclared keys, or
    /// the mismatch reported by [`CustomFieldDef::check`].
    pub fn validate(&self, field: &CustomField) -> Result<(), RecordError> {
        self.field(&field.name)
            .ok_or_else(|| RecordError::UnknownCustomField {
                doc_type: self.name.clone(),
                field: field.name.clone(),
            })?
            .check(field)
    }
}

/// Look up a document type by name
#[must_use]
pub fn find_doc_type<'a>(defs: &'a [DocumentTypeDef], name: &str) -> Option<&'a DocumentTypeDef> {
    defs.iter().find(|dt| dt.name == name)
}

/// Custom field as persisted in the datastore
///
/// Keyed by document type and display name. `PEOPLE` values are stored as a
/// JSON-encoded string array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCustomField {
    pub doc_type: String,
    pub display_name: String,
    pub value: String,
}

impl PersistedCustomField {
    /// Decode the stored value according to the declaration
    ///
    /// # Errors
    /// Returns [`RecordError::CorruptCustomField`] if a `PEOPLE` value is not
    /// a JSON string array.
    pub fn decode(&self, def: &CustomFieldDef) -> Result<CustomField, RecordError> {
        match def.field_type {
            CustomFieldType::String => Ok(CustomField::text(def, self.value.clone())),
            CustomFieldType::People => {
                let people: Vec<String> = serde_json::from_str(&self.value).map_err(|e| {
                    RecordError::CorruptCustomField {
                        field: self.display_name.clone(),
                        message: e.to_string(),
                    }
                })?;
                Ok(CustomField::people(def, people))
            }
        }
    }
}

/// Upsert a value into persisted custom fields; an empty value removes it
pub fn upsert_persisted(
    fields: &mut Vec<PersistedCustomField>,
    doc_type: &str,
    display_name: &str,
    value: &CustomFieldValue,
) {
    if value.is_empty() {
        fields.retain(|f| f.display_name != display_name);
        return;
    }
    let encoded = match value {
        CustomFieldValue::Text(s) => s.clone(),
        // A Vec<String> always serializes.
        CustomFieldValue::People(p) => serde_json::to_string(p).unwrap_or_default(),
    };
    match fields.iter_mut().find(|f| f.display_name == display_name) {
        Some(existing) => existing.value = encoded,
        None => fields.push(PersistedCustomField {
            doc_type: doc_type.to_string(),
            display_name: display_name.to_string(),
            value: encoded,
        }),
    }
}

/// `Current Version` -> `currentVersion`
#[must_use]
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, word) in name
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}
