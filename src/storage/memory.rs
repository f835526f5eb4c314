//! In-memory store implementations.
//!
//! Same contracts as the Redis stores, held in process memory behind a
//! mutex. Used by the test suites and by `STORE_BACKEND=memory`.

use super::{sort_newest_first, CodeStore, IdentityStore, ResourceStore, StoreError};
use crate::models::{
    unix_now, Identity, NewIdentity, NewResource, Purpose, Resource, ResourceFilter,
    ResourceStatus,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Identities
// ============================================================================

#[derive(Default)]
struct IdentityTable {
    next_id: i64,
    by_id: HashMap<i64, Identity>,
    by_email: HashMap<String, i64>,
    by_phone: HashMap<String, i64>,
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    table: Mutex<IdentityTable>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut table = lock(&self.table);

        if let Some(ref email) = new.email {
            if table.by_email.contains_key(email) {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }
        if let Some(ref phone) = new.phone_number {
            if table.by_phone.contains_key(phone) {
                return Err(StoreError::Conflict("phone already registered".to_string()));
            }
        }

        table.next_id += 1;
        let identity = Identity {
            id: table.next_id,
            name: new.name,
            email: new.email,
            phone_number: new.phone_number,
            password_hash: new.password_hash,
            role: new.role,
            school: String::new(),
            student_id: String::new(),
            birthdate: String::new(),
            address: String::new(),
            gender: String::new(),
            created_at: unix_now(),
        };

        if let Some(ref email) = identity.email {
            table.by_email.insert(email.clone(), identity.id);
        }
        if let Some(ref phone) = identity.phone_number {
            table.by_phone.insert(phone.clone(), identity.id);
        }
        table.by_id.insert(identity.id, identity.clone());

        Ok(identity)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        Ok(lock(&self.table).by_id.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let table = lock(&self.table);
        Ok(table
            .by_email
            .get(email)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn get_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError> {
        let table = lock(&self.table);
        Ok(table
            .by_phone
            .get(phone)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn update(&self, identity: &Identity) -> Result<(), StoreError> {
        lock(&self.table)
            .by_id
            .insert(identity.id, identity.clone());
        Ok(())
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Default)]
struct ResourceTable {
    next_id: i64,
    rows: BTreeMap<i64, Resource>,
}

#[derive(Default)]
pub struct MemoryResourceStore {
    table: Mutex<ResourceTable>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn create(&self, new: NewResource) -> Result<Resource, StoreError> {
        let mut table = lock(&self.table);
        table.next_id += 1;

        let resource = Resource {
            id: table.next_id,
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            subject: new.subject,
            resource_type: new.resource_type,
            filename: new.filename,
            original_name: new.original_name,
            size: new.size,
            file_hash: new.file_hash,
            status: new.status,
            created_at: unix_now(),
        };
        table.rows.insert(resource.id, resource.clone());

        Ok(resource)
    }

    async fn get(&self, id: i64) -> Result<Option<Resource>, StoreError> {
        Ok(lock(&self.table).rows.get(&id).cloned())
    }

    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let mut resources: Vec<Resource> = lock(&self.table)
            .rows
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut resources);
        Ok(resources)
    }

    async fn update_status(&self, id: i64, status: ResourceStatus) -> Result<bool, StoreError> {
        match lock(&self.table).rows.get_mut(&id) {
            Some(resource) => {
                resource.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Vec<Resource>, StoreError> {
        Ok(lock(&self.table)
            .rows
            .values()
            .filter(|r| r.file_hash == hash)
            .cloned()
            .collect())
    }
}

// ============================================================================
// One-time codes
// ============================================================================

struct CodeEntry {
    code: String,
    expires_at: Instant,
}

/// Expiry is measured on the tokio clock, so paused-time tests can step past it.
#[derive(Default)]
pub struct MemoryCodeStore {
    codes: Mutex<HashMap<(String, Purpose), CodeEntry>>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, expired or not.
    pub fn tracked_codes(&self) -> usize {
        lock(&self.codes).len()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn save(
        &self,
        key: &str,
        code: &str,
        purpose: Purpose,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let map_key = (key.to_string(), purpose);
        // Mirror the Redis store: evict, then insert, as two steps.
        // Expired entries for other keys are reclaimed on the way.
        {
            let mut codes = lock(&self.codes);
            let now = Instant::now();
            codes.retain(|_, entry| now <= entry.expires_at);
            codes.remove(&map_key);
        }
        lock(&self.codes).insert(
            map_key,
            CodeEntry {
                code: code.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str, purpose: Purpose) -> Result<Option<String>, StoreError> {
        let codes = lock(&self.codes);
        Ok(codes
            .get(&(key.to_string(), purpose))
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.code.clone()))
    }

    async fn delete(&self, key: &str, purpose: Purpose) -> Result<(), StoreError> {
        lock(&self.codes).remove(&(key.to_string(), purpose));
        Ok(())
    }
}
