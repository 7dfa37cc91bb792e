//! Subordinate record storage
//!
//! A superior remembers, for every entity it vouches for, the federation
//! keys it saw when the subordination was registered. Subordinate Statements
//! are signed from these records, never from a fresh fetch.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fedcert_core::{EntityId, JwkSet};
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// What a superior knows about one subordinate
#[derive(Debug, Clone, PartialEq)]
pub struct SubordinateRecord {
    /// Subordinate identifier
    pub entity_id: EntityId,
    /// Federation keys the superior vouches for
    pub jwks: JwkSet,
    /// When the subordination was registered
    pub registered_at: DateTime<Utc>,
}

impl SubordinateRecord {
    pub fn new(entity_id: EntityId, jwks: JwkSet) -> Self {
        Self {
            entity_id,
            jwks,
            registered_at: Utc::now(),
        }
    }
}

/// Storage backend for subordinate records
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait SubordinateStore: Send + Sync + Debug {
    /// Store a record, replacing an existing record for the same entity
    async fn register(&self, record: SubordinateRecord) -> Result<(), StorageError>;

    /// Get the record for a subordinate
    async fn get(&self, entity_id: &EntityId) -> Result<Option<SubordinateRecord>, StorageError>;

    /// List subordinate identifiers in registration order
    async fn list(&self) -> Result<Vec<EntityId>, StorageError>;
}
