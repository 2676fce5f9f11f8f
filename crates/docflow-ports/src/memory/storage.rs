use super::faults::FaultPlan;
use crate::error::{PortError, PortResult};
use crate::storage::{
    FileMetadata, HeaderMetadata, Permission, Revision, ShareRole, StorageCapabilities,
    StorageProvider,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_record::DocumentId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A file held by [`MemoryStorage`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub folder: String,
    pub modified_time: DateTime<Utc>,
    /// Revision ids, oldest first
    pub revisions: Vec<String>,
    pub pinned: BTreeSet<String>,
    pub permissions: Vec<Permission>,
    /// Every header written, oldest first
    pub headers: Vec<HeaderMetadata>,
    /// Template the file was copied from
    pub template: Option<String>,
}

impl StoredFile {
    #[must_use]
    pub fn last_header(&self) -> Option<&HeaderMetadata> {
        self.headers.last()
    }

    #[must_use]
    pub fn has_writer(&self, email: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.email == email && p.role == ShareRole::Writer)
    }
}

#[derive(Debug, Default)]
struct StorageState {
    files: HashMap<DocumentId, StoredFile>,
    folders: HashMap<(String, String), String>,
    shortcuts: Vec<(DocumentId, String)>,
    groups: HashMap<String, Vec<String>>,
    locked: HashSet<DocumentId>,
}

/// In-memory storage provider
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
    faults: FaultPlan,
    capabilities: StorageCapabilities,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StorageState::default()),
            faults: FaultPlan::new(),
            capabilities: StorageCapabilities::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: StorageCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[inline]
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Add a file with a single initial revision
    pub fn add_file(&self, id: &DocumentId, name: &str, folder: &str) {
        let file = StoredFile {
            name: name.to_string(),
            folder: folder.to_string(),
            modified_time: Utc::now(),
            revisions: vec![format!("{id}-rev-1")],
            pinned: BTreeSet::new(),
            permissions: Vec::new(),
            headers: Vec::new(),
            template: None,
        };
        self.state.lock().files.insert(id.clone(), file);
    }

    /// Append a new revision and return its id
    pub fn add_revision(&self, id: &DocumentId) -> Option<String> {
        let mut state = self.state.lock();
        let file = state.files.get_mut(id)?;
        let rev = format!("{id}-rev-{}", file.revisions.len() + 1);
        file.revisions.push(rev.clone());
        file.modified_time = Utc::now();
        Some(rev)
    }

    #[must_use]
    pub fn file(&self, id: &DocumentId) -> Option<StoredFile> {
        self.state.lock().files.get(id).cloned()
    }

    /// Ids of every stored file, sorted
    #[must_use]
    pub fn file_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.state.lock().files.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn set_locked(&self, id: &DocumentId, locked: bool) {
        let mut state = self.state.lock();
        if locked {
            state.locked.insert(id.clone());
        } else {
            state.locked.remove(id);
        }
    }

    pub fn set_user_groups(&self, email: &str, groups: &[&str]) {
        self.state.lock().groups.insert(
            email.to_string(),
            groups.iter().map(|g| (*g).to_string()).collect(),
        );
    }

    /// Shortcuts created so far as (document, folder) pairs
    #[must_use]
    pub fn shortcuts(&self) -> Vec<(DocumentId, String)> {
        self.state.lock().shortcuts.clone()
    }

    fn with_file<T>(
        &self,
        id: &DocumentId,
        f: impl FnOnce(&mut StoredFile) -> PortResult<T>,
    ) -> PortResult<T> {
        let mut state = self.state.lock();
        let file = state
            .files
            .get_mut(id)
            .ok_or_else(|| PortError::not_found("file", id.as_str()))?;
        f(file)
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    fn capabilities(&self) -> StorageCapabilities {
        self.capabilities
    }

    async fn get_file(&self, id: &DocumentId) -> PortResult<FileMetadata> {
        self.faults.check("get_file")?;
        self.with_file(id, |file| {
            Ok(FileMetadata {
                id: id.clone(),
                name: file.name.clone(),
                folder: file.folder.clone(),
                modified_time: file.modified_time,
            })
        })
    }

    async fn create_file(
        &self,
        name: &str,
        folder: &str,
        template: Option<String>,
    ) -> PortResult<FileMetadata> {
        self.faults.check("create_file")?;
        let id = DocumentId::parse(format!("file-{}", uuid::Uuid::new_v4()))?;
        let mut state = self.state.lock();
        if let Some(template) = &template {
            if !state.files.keys().any(|file| file.as_str() == template.as_str()) {
                return Err(PortError::not_found("template", template.as_str()));
            }
        }
        let modified_time = Utc::now();
        state.files.insert(
            id.clone(),
            StoredFile {
                name: name.to_string(),
                folder: folder.to_string(),
                modified_time,
                revisions: vec![format!("{id}-rev-1")],
                pinned: BTreeSet::new(),
                permissions: Vec::new(),
                headers: Vec::new(),
                template,
            },
        );
        Ok(FileMetadata {
            id,
            name: name.to_string(),
            folder: folder.to_string(),
            modified_time,
        })
    }

    async fn get_latest_revision(&self, id: &DocumentId) -> PortResult<Revision> {
        self.faults.check("get_latest_revision")?;
        self.with_file(id, |file| {
            let rev = file
                .revisions
                .last()
                .ok_or_else(|| PortError::not_found("revision", id.as_str()))?;
            Ok(Revision {
                id: rev.clone(),
                modified_time: file.modified_time,
            })
        })
    }

    async fn keep_revision_forever(&self, id: &DocumentId, revision_id: &str) -> PortResult<()> {
        self.faults.check("keep_revision_forever")?;
        self.with_file(id, |file| {
            if !file.revisions.iter().any(|r| r == revision_id) {
                return Err(PortError::not_found("revision", revision_id));
            }
            file.pinned.insert(revision_id.to_string());
            Ok(())
        })
    }

    async fn unmark_keep_forever(&self, id: &DocumentId, revision_id: &str) -> PortResult<()> {
        self.faults.check("unmark_keep_forever")?;
        self.with_file(id, |file| {
            file.pinned.remove(revision_id);
            Ok(())
        })
    }

    async fn move_file(&self, id: &DocumentId, dest_folder: &str) -> PortResult<()> {
        self.faults.check("move_file")?;
        self.with_file(id, |file| {
            file.folder = dest_folder.to_string();
            Ok(())
        })
    }

    async fn create_shortcut(&self, id: &DocumentId, folder: &str) -> PortResult<String> {
        self.faults.check("create_shortcut")?;
        let mut state = self.state.lock();
        if !state.files.contains_key(id) {
            return Err(PortError::not_found("file", id.as_str()));
        }
        state.shortcuts.push((id.clone(), folder.to_string()));
        Ok(format!("shortcut-{}", uuid::Uuid::new_v4()))
    }

    async fn get_or_create_subfolder(&self, parent: &str, name: &str) -> PortResult<String> {
        self.faults.check("get_or_create_subfolder")?;
        let mut state = self.state.lock();
        let folder = state
            .folders
            .entry((parent.to_string(), name.to_string()))
            .or_insert_with(|| format!("{parent}/{name}"));
        Ok(folder.clone())
    }

    async fn share_file(&self, id: &DocumentId, email: &str, role: ShareRole) -> PortResult<()> {
        self.faults.check("share_file")?;
        self.with_file(id, |file| {
            match file.permissions.iter_mut().find(|p| p.email == email) {
                Some(existing) => existing.role = role,
                None => file.permissions.push(Permission {
                    id: format!("perm-{}", uuid::Uuid::new_v4()),
                    email: email.to_string(),
                    role,
                }),
            }
            Ok(())
        })
    }

    async fn list_permissions(&self, id: &DocumentId) -> PortResult<Vec<Permission>> {
        self.faults.check("list_permissions")?;
        self.with_file(id, |file| Ok(file.permissions.clone()))
    }

    async fn delete_permission(&self, id: &DocumentId, permission_id: &str) -> PortResult<()> {
        self.faults.check("delete_permission")?;
        self.with_file(id, |file| {
            file.permissions.retain(|p| p.id != permission_id);
            Ok(())
        })
    }

    async fn rename_file(&self, id: &DocumentId, name: &str) -> PortResult<()> {
        self.faults.check("rename_file")?;
        self.with_file(id, |file| {
            file.name = name.to_string();
            Ok(())
        })
    }

    async fn delete_file(&self, id: &DocumentId) -> PortResult<()> {
        self.faults.check("delete_file")?;
        self.state
            .lock()
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PortError::not_found("file", id.as_str()))
    }

    async fn list_user_groups(&self, email: &str) -> PortResult<Vec<String>> {
        self.faults.check("list_user_groups")?;
        Ok(self.state.lock().groups.get(email).cloned().unwrap_or_default())
    }

    async fn is_locked(&self, id: &DocumentId) -> PortResult<bool> {
        self.faults.check("is_locked")?;
        let state = self.state.lock();
        if !state.files.contains_key(id) {
            return Err(PortError::not_found("file", id.as_str()));
        }
        Ok(state.locked.contains(id))
    }

    async fn rewrite_header(&self, id: &DocumentId, metadata: &HeaderMetadata) -> PortResult<()> {
        self.faults.check("rewrite_header")?;
        self.with_file(id, |file| {
            file.headers.push(metadata.clone());
            file.modified_time = Utc::now();
            Ok(())
        })
    }
}
