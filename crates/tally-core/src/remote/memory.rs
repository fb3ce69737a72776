//! In-memory remote store for tests and local/demo embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

use super::{DocRef, Document, RemoteStore, WritePayload};

/// `RemoteStore` backed by process memory.
///
/// `set_permission_denied(true)` makes every call fail the way the hosted
/// store does when security rules reject a request; used to exercise the
/// benign-logout path.
#[derive(Default)]
pub struct MemoryRemoteStore {
    docs: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    permission_denied: AtomicBool,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate security rules rejecting every request.
    pub fn set_permission_denied(&self, denied: bool) {
        self.permission_denied.store(denied, Ordering::SeqCst);
    }

    /// Number of documents in a collection (test helper).
    pub fn len(&self, collection: &str) -> usize {
        self.docs
            .read()
            .map(|docs| docs.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Whether a collection holds no documents (test helper).
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_permission(&self) -> Result<()> {
        if self.permission_denied.load(Ordering::SeqCst) {
            return Err(Error::PermissionDenied(
                "request rejected by security rules".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve(payload: WritePayload) -> Document {
        payload
            .into_iter()
            .map(|(key, write)| (key, write.resolve()))
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.check_permission()?;
        let docs = self
            .docs
            .read()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        Ok(docs.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn create(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()> {
        self.check_permission()?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        docs.entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Self::resolve(payload));
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()> {
        self.check_permission()?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        let doc = docs
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (key, value) in Self::resolve(payload) {
            doc.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_permission()?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        if let Some(collection) = docs.get_mut(collection) {
            collection.remove(id);
        }
        Ok(())
    }

    async fn delete_all(&self, refs: Vec<DocRef>) -> Result<()> {
        self.check_permission()?;
        // One write lock for the whole batch keeps it all-or-nothing.
        let mut docs = self
            .docs
            .write()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        for doc_ref in refs {
            if let Some(collection) = docs.get_mut(doc_ref.collection) {
                collection.remove(&doc_ref.id);
            }
        }
        Ok(())
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>> {
        self.check_permission()?;
        let docs = self
            .docs
            .read()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        Ok(docs
            .get(collection)
            .map(|collection| {
                collection
                    .values()
                    .filter(|doc| {
                        doc.get(field)
                            .and_then(Value::as_array)
                            .is_some_and(|items| {
                                items.iter().any(|item| item.as_str() == Some(value))
                            })
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        self.check_permission()?;
        let docs = self
            .docs
            .read()
            .map_err(|_| Error::Remote("store lock poisoned".to_string()))?;
        Ok(docs
            .get(collection)
            .map(|collection| {
                collection
                    .values()
                    .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
