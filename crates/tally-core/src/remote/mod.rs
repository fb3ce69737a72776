//! Remote store port: transport-level access to the durable document store.
//!
//! The adapter (`adapter.rs`) translates entities to/from documents and
//! validates them; implementations of [`RemoteStore`] only move documents.
//! They never merge snapshots — that is the merge engine's job.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::clock::Stamp;
use crate::error::Result;

mod adapter;
mod memory;

pub use adapter::RemoteAdapter;
pub use memory::MemoryRemoteStore;

/// Logical collection names in the remote store.
pub mod collections {
    pub const USERS: &str = "users";
    pub const USER_CODES: &str = "userCodes";
    pub const TOURNAMENTS: &str = "tournaments";
    pub const GAME_SESSIONS: &str = "gameSessions";
    pub const SHELVES: &str = "shelves";
    pub const SHELF_LAYOUTS: &str = "shelfLayouts";
}

/// A raw remote document.
pub type Document = serde_json::Map<String, Value>;

/// One field of a write payload.
///
/// `ServerTime` replaces the source SDK's "set server time now" sentinel with
/// an explicit variant, so store implementations resolve it without runtime
/// type-sniffing.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Set(Value),
    ServerTime,
}

impl FieldWrite {
    /// Resolve to a concrete JSON value at write time.
    #[must_use]
    pub fn resolve(self) -> Value {
        match self {
            Self::Set(value) => value,
            Self::ServerTime => Value::from(Stamp::now().epoch_millis()),
        }
    }
}

/// An ordered field→write map for one document.
pub type WritePayload = BTreeMap<String, FieldWrite>;

/// Reference to one document, used by atomic delete batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    pub collection: &'static str,
    pub id: String,
}

/// Transport trait for the durable document store.
///
/// Every method is a suspension point from the orchestrator's perspective.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch one document, `None` when absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Non-merge write for a brand-new document. Replaces any existing
    /// content so an "update" can never bypass creation-only validation.
    async fn create(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()>;

    /// Merge write: fields absent from the payload are preserved remotely.
    async fn merge(&self, collection: &str, id: &str, payload: WritePayload) -> Result<()>;

    /// Delete one document (idempotent).
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Delete a batch of documents transactionally (all-or-nothing).
    async fn delete_all(&self, refs: Vec<DocRef>) -> Result<()>;

    /// Documents whose array `field` contains `value`.
    async fn query_array_contains(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>>;

    /// Documents whose string `field` equals `value`.
    async fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>>;
}

/// Build a write payload from a serializable entity, with every field
/// concrete except the ones the caller promotes to [`FieldWrite::ServerTime`].
pub fn payload_from<T: Serialize>(entity: &T, server_time_fields: &[&str]) -> Result<WritePayload> {
    let value = serde_json::to_value(entity)?;
    let Value::Object(map) = value else {
        return Err(crate::error::Error::InvalidInput(
            "entity did not serialize to a document".to_string(),
        ));
    };

    let mut payload: WritePayload = map
        .into_iter()
        .map(|(key, value)| (key, FieldWrite::Set(value)))
        .collect();
    for field in server_time_fields {
        payload.insert((*field).to_string(), FieldWrite::ServerTime);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tournament;

    #[test]
    fn payload_promotes_server_time_fields() {
        let tournament = Tournament::new("Cup", "u1", None);
        let payload = payload_from(&tournament, &["updatedAt"]).unwrap();

        assert_eq!(payload.get("updatedAt"), Some(&FieldWrite::ServerTime));
        assert!(matches!(payload.get("name"), Some(FieldWrite::Set(_))));
    }

    #[test]
    fn server_time_resolves_to_current_millis() {
        let resolved = FieldWrite::ServerTime.resolve();
        assert!(resolved.as_i64().unwrap() > 1_600_000_000_000);
    }
}
