//! Engine configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! base_url = "https://docs.example.com"
//!
//! [folders]
//! drafts = "drafts-folder-id"
//! documents = "docs-folder-id"
//! shortcuts = "shortcuts-folder-id"
//!
//! [email]
//! enabled = true
//! from_address = "docs@example.com"
//!
//! [[document_types]]
//! name = "RFC"
//! longName = "Request for Comments"
//! customFields = [{ name = "Current Version", type = "string" }]
//! ```

use docflow_record::{find_doc_type, DocumentId, DocumentTypeDef};
use http::Uri;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Storage folders used by the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    pub drafts: String,
    pub documents: String,
    pub shortcuts: String,
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            drafts: "drafts".to_string(),
            documents: "documents".to_string(),
            shortcuts: "shortcuts".to_string(),
        }
    }
}

/// Outgoing notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub enabled: bool,
    pub from_address: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_address: "docflow@localhost".to_string(),
        }
    }
}

/// Background work queue settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Tasks that may wait before new ones are dropped
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Public base URL of the web application
    pub base_url: String,
    pub folders: FolderConfig,
    pub email: EmailConfig,
    pub document_types: Vec<DocumentTypeDef>,
    pub background: BackgroundConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            folders: FolderConfig::default(),
            email: EmailConfig::default(),
            document_types: Vec::new(),
            background: BackgroundConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on syntax errors and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// as [`EngineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_folders(mut self, folders: FolderConfig) -> Self {
        self.folders = folders;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_email(mut self, enabled: bool) -> Self {
        self.email.enabled = enabled;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_document_type(mut self, doc_type: DocumentTypeDef) -> Self {
        self.document_types.push(doc_type);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_background(mut self, background: BackgroundConfig) -> Self {
        self.background = background;
        self
    }

    /// Check values serde cannot
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri: Uri = self
            .base_url
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("base_url {:?}: {e}", self.base_url)))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ConfigError::Invalid(format!(
                "base_url {:?} must be an absolute URL",
                self.base_url
            )));
        }

        for (name, value) in [
            ("folders.drafts", &self.folders.drafts),
            ("folders.documents", &self.folders.documents),
            ("folders.shortcuts", &self.folders.shortcuts),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        if self.background.queue_capacity == 0 || self.background.workers == 0 {
            return Err(ConfigError::Invalid(
                "background queue capacity and workers must be positive".to_string(),
            ));
        }

        let mut type_names = HashSet::new();
        for dt in &self.document_types {
            if !type_names.insert(dt.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate document type {:?}",
                    dt.name
                )));
            }
            let mut keys = HashSet::new();
            for field in &dt.custom_fields {
                if !keys.insert(field.key()) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate custom field {:?} in document type {:?}",
                        field.name, dt.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Link to a document in the web application
    #[must_use]
    pub fn document_url(&self, id: &DocumentId) -> String {
        format!("{}/document/{id}", self.base_url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn doc_type(&self, name: &str) -> Option<&DocumentTypeDef> {
        find_doc_type(&self.document_types, name)
    }
}
