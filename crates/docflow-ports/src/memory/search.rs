use super::faults::FaultPlan;
use crate::error::{PortError, PortResult};
use crate::search::{IndexKind, RedirectStore, SearchIndex};
use async_trait::async_trait;
use dashmap::DashMap;
use docflow_record::DocumentId;
use serde_json::{Map, Value};

/// In-memory search index and redirect store
#[derive(Debug, Default)]
pub struct MemorySearch {
    objects: DashMap<(IndexKind, String), Map<String, Value>>,
    links: DashMap<String, DocumentId>,
    faults: FaultPlan,
}

impl MemorySearch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    #[inline]
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    #[must_use]
    pub fn object(&self, kind: IndexKind, id: &DocumentId) -> Option<Map<String, Value>> {
        self.objects
            .get(&(kind, id.as_str().to_string()))
            .map(|o| o.clone())
    }

    /// Overwrite a stored object directly
    pub fn put_object(&self, kind: IndexKind, id: &DocumentId, object: Map<String, Value>) {
        self.objects.insert((kind, id.as_str().to_string()), object);
    }

    #[must_use]
    pub fn link(&self, key: &str) -> Option<DocumentId> {
        self.links.get(key).map(|id| id.clone())
    }
}

#[async_trait]
impl SearchIndex for MemorySearch {
    async fn index(&self, kind: IndexKind, object: Map<String, Value>) -> PortResult<()> {
        self.faults.check("index")?;
        let id = object
            .get("objectID")
            .and_then(Value::as_str)
            .ok_or_else(|| PortError::failed("index", "object has no objectID"))?
            .to_string();
        self.objects.insert((kind, id), object);
        Ok(())
    }

    async fn get_object(&self, kind: IndexKind, id: &DocumentId) -> PortResult<Map<String, Value>> {
        self.faults.check("get_object")?;
        self.object(kind, id)
            .ok_or_else(|| PortError::not_found("index object", id.as_str()))
    }

    async fn delete(&self, kind: IndexKind, id: &DocumentId) -> PortResult<()> {
        self.faults.check("delete")?;
        self.objects.remove(&(kind, id.as_str().to_string()));
        Ok(())
    }
}

#[async_trait]
impl RedirectStore for MemorySearch {
    async fn save_link(&self, key: &str, id: &DocumentId) -> PortResult<()> {
        self.faults.check("save_link")?;
        self.links.insert(key.to_string(), id.clone());
        Ok(())
    }

    async fn delete_link(&self, key: &str) -> PortResult<()> {
        self.faults.check("delete_link")?;
        self.links.remove(key);
        Ok(())
    }
}
