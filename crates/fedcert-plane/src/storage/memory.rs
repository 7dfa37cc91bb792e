//! In-memory storage backend
//!
//! Default storage implementation. Data is lost on restart.

use async_trait::async_trait;
use fedcert_core::EntityId;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

use super::{StorageError, SubordinateRecord, SubordinateStore};

/// In-memory subordinate store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<EntityId, SubordinateRecord>>,
    order: RwLock<Vec<EntityId>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubordinateStore for MemoryStore {
    async fn register(&self, record: SubordinateRecord) -> Result<(), StorageError> {
        let mut records = self.records.write().unwrap();
        info!(
            subordinate = %record.entity_id,
            kids = ?record.jwks.kids(),
            "Storing subordinate record"
        );

        let id = record.entity_id.clone();
        if records.insert(id.clone(), record).is_none() {
            self.order.write().unwrap().push(id);
        }
        Ok(())
    }

    async fn get(&self, entity_id: &EntityId) -> Result<Option<SubordinateRecord>, StorageError> {
        let records = self.records.read().unwrap();
        Ok(records.get(entity_id).cloned())
    }

    async fn list(&self) -> Result<Vec<EntityId>, StorageError> {
        Ok(self.order.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedcert_core::JwkSet;

    fn id(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let store = MemoryStore::new();
        store
            .register(SubordinateRecord::new(id("https://a.example"), JwkSet::default()))
            .await
            .unwrap();

        let record = store.get(&id("https://a.example")).await.unwrap().unwrap();
        assert_eq!(record.entity_id, id("https://a.example"));
        assert!(store.get(&id("https://b.example")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_keeps_registration_order() {
        let store = MemoryStore::new();
        for name in ["https://c.example", "https://a.example", "https://c.example"] {
            store
                .register(SubordinateRecord::new(id(name), JwkSet::default()))
                .await
                .unwrap();
        }

        assert_eq!(
            store.list().await.unwrap(),
            vec![id("https://c.example"), id("https://a.example")]
        );
    }
}
