//! File-backed remote store.
//!
//! Persists the document collections as one JSON file so multiple invocations
//! (or multiple machines pointing at a shared folder) see the same remote
//! state. Every operation is a full read-modify-write under a process-local
//! lock; last writer wins at file granularity, matching the engine's
//! entity-level conflict model.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use tally_core::error::{Error, Result};
use tally_core::remote::{DocRef, Document, RemoteStore, WritePayload};

type Collections = HashMap<String, BTreeMap<String, Document>>;

pub struct FileRemoteStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRemoteStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Collections> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| Error::Remote(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collections::default()),
            Err(e) => Err(Error::Remote(e.to_string())),
        }
    }

    fn save(&self, collections: &Collections) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Remote(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(collections).map_err(|e| Error::Remote(e.to_string()))?;
        std::fs::write(&self.path, contents).map_err(|e| Error::Remote(e.to_string()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(payload: WritePayload) -> Document {
        payload
            .into_iter()
            .map(|(key, write)| (key, write.resolve()))
            .collect()
    }
}

#[async_trait]
impl RemoteStore for FileRemoteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let _guard = self.lock.lock().await;
        let collections = self.load()?;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn create(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Self::resolve(payload));
        self.save(&collections)
    }

    async fn merge(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load()?;
        let doc = collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default();
        for (key, value) in Self::resolve(payload) {
            doc.insert(key, value);
        }
        self.save(&collections)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load()?;
        if let Some(collection) = collections.get_mut(collection) {
            collection.remove(id);
        }
        self.save(&collections)
    }

    async fn delete_all(&self, refs: Vec<DocRef>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut collections = self.load()?;
        for doc_ref in refs {
            if let Some(collection) = collections.get_mut(doc_ref.collection) {
                collection.remove(&doc_ref.id);
            }
        }
        self.save(&collections)
    }

    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>> {
        let _guard = self.lock.lock().await;
        let collections = self.load()?;
        Ok(collections
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
        let _guard = self.lock.lock().await;
        let collections = self.load()?;
        Ok(collections
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

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use tally_core::remote::FieldWrite;

    use super::*;

    fn unique_test_store_path() -> PathBuf {
        static NEXT_TEST_STORE_ID: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_nanos());
        let sequence = NEXT_TEST_STORE_ID.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("tally-remote-test-{timestamp}-{sequence}.json"))
    }

    fn payload(pairs: &[(&str, Value)]) -> WritePayload {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), FieldWrite::Set(value.clone())))
            .collect()
    }

    #[tokio::test]
    async fn documents_survive_a_new_store_handle() {
        let path = unique_test_store_path();
        {
            let store = FileRemoteStore::new(&path);
            store
                .create("tournaments", "t1", payload(&[("name", "Cup".into())]))
                .await
                .unwrap();
        }

        let reopened = FileRemoteStore::new(&path);
        let doc = reopened.get("tournaments", "t1").await.unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("Cup")));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let store = FileRemoteStore::new(unique_test_store_path());
        assert_eq!(store.get("tournaments", "t1").await.unwrap(), None);
        assert!(store
            .query_eq("gameSessions", "ownerId", "u1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn merge_preserves_fields_absent_from_payload() {
        let path = unique_test_store_path();
        let store = FileRemoteStore::new(&path);
        store
            .create(
                "tournaments",
                "t1",
                payload(&[("name", "Cup".into()), ("state", "setup".into())]),
            )
            .await
            .unwrap();
        store
            .merge("tournaments", "t1", payload(&[("state", "active".into())]))
            .await
            .unwrap();

        let doc = store.get("tournaments", "t1").await.unwrap().unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("Cup")));
        assert_eq!(doc.get("state"), Some(&Value::from("active")));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn delete_all_removes_across_collections() {
        let path = unique_test_store_path();
        let store = FileRemoteStore::new(&path);
        store
            .create("tournaments", "t1", payload(&[("name", "Cup".into())]))
            .await
            .unwrap();
        store
            .create("gameSessions", "s1", payload(&[("gameName", "Azul".into())]))
            .await
            .unwrap();

        store
            .delete_all(vec![
                DocRef {
                    collection: "tournaments",
                    id: "t1".into(),
                },
                DocRef {
                    collection: "gameSessions",
                    id: "s1".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(store.get("tournaments", "t1").await.unwrap(), None);
        assert_eq!(store.get("gameSessions", "s1").await.unwrap(), None);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn array_contains_query_matches_membership() {
        let path = unique_test_store_path();
        let store = FileRemoteStore::new(&path);
        store
            .create(
                "tournaments",
                "t1",
                payload(&[("memberIds", serde_json::json!(["u1", "u2"]))]),
            )
            .await
            .unwrap();
        store
            .create(
                "tournaments",
                "t2",
                payload(&[("memberIds", serde_json::json!(["u3"]))]),
            )
            .await
            .unwrap();

        let hits = store
            .query_array_contains("tournaments", "memberIds", "u1")
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
