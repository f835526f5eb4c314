//! Metadata stores for identities, resources and one-time codes.
//!
//! Each store is an async trait so the engine and the intake pipeline can
//! be handed either the Redis implementation (production) or the
//! in-memory one (tests, `STORE_BACKEND=memory`). Implementations are
//! reliable per single operation; nothing here spans calls atomically.

pub mod code;
pub mod identity;
pub mod memory;
pub mod resource;

use crate::models::{
    Identity, NewIdentity, NewResource, Purpose, Resource, ResourceFilter, ResourceStatus,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

pub use code::RedisCodeStore;
pub use identity::RedisIdentityStore;
pub use memory::{MemoryCodeStore, MemoryIdentityStore, MemoryResourceStore};
pub use resource::RedisResourceStore;

/// Error type for metadata store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A unique field (email, phone) is already claimed.
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Persist a new identity. Fails with `Conflict` if its email or phone
    /// already belongs to another identity.
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn get_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError>;

    /// Overwrite the stored record (profile fields and role).
    async fn update(&self, identity: &Identity) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create(&self, new: NewResource) -> Result<Resource, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Resource>, StoreError>;

    /// Matching resources, newest first.
    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError>;

    /// Set the status. Returns false if no resource has this id.
    async fn update_status(&self, id: i64, status: ResourceStatus) -> Result<bool, StoreError>;

    async fn find_by_hash(&self, hash: &str) -> Result<Vec<Resource>, StoreError>;
}

/// One-time code persistence keyed by (key, purpose).
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Replace any live code for (key, purpose) with `code`, valid for `ttl`.
    ///
    /// The replace is a delete followed by an insert, not one atomic swap:
    /// a concurrent `get` may briefly observe no code at all.
    async fn save(
        &self,
        key: &str,
        code: &str,
        purpose: Purpose,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// The live code, or `None` if absent or expired. Never deletes.
    async fn get(&self, key: &str, purpose: Purpose) -> Result<Option<String>, StoreError>;

    /// Idempotent.
    async fn delete(&self, key: &str, purpose: Purpose) -> Result<(), StoreError>;
}

/// Newest first: creation time, then id.
pub(crate) fn sort_newest_first(resources: &mut [Resource]) {
    resources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a stored JSON value, zeroizing the raw string afterwards.
pub(crate) fn decode<T: DeserializeOwned>(data: String) -> Result<T, StoreError> {
    let data = Zeroizing::new(data);
    Ok(serde_json::from_str(&data)?)
}

/// Open a multiplexed connection, or `None` if Redis is unreachable.
/// Test helper for the Redis-backed stores.
#[cfg(test)]
pub(crate) async fn test_connection() -> Option<redis::aio::MultiplexedConnection> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url).ok()?;
    match client.get_multiplexed_async_connection().await {
        Ok(con) => Some(con),
        Err(_) => {
            eprintln!("Skipping test: Redis connection failed");
            None
        }
    }
}
