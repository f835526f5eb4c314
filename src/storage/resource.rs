//! Resource Redis operations.
//!
//! Redis key patterns:
//! - `counter:resource` — last assigned resource id (INCR)
//! - `resource:{id}` — resource metadata (JSON)
//! - `resource_hash:{sha256}` — SET of resource ids sharing a content hash
//! - `resource_index` — ZSET of every resource id, scored by id

use super::{decode, encode, sort_newest_first, ResourceStore, StoreError};
use crate::models::{unix_now, NewResource, Resource, ResourceFilter, ResourceStatus};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const NEXT_ID_KEY: &str = "counter:resource";
const INDEX_KEY: &str = "resource_index";

/// Ids fetched per MGET round while listing.
const LIST_PAGE: isize = 500;

fn resource_key(id: i64) -> String {
    format!("resource:{}", id)
}

fn hash_key(hash: &str) -> String {
    format!("resource_hash:{}", hash)
}

#[derive(Clone)]
pub struct RedisResourceStore {
    con: MultiplexedConnection,
}

impl RedisResourceStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        RedisResourceStore { con }
    }
}

#[async_trait]
impl ResourceStore for RedisResourceStore {
    async fn create(&self, new: NewResource) -> Result<Resource, StoreError> {
        let mut con = self.con.clone();
        let id: i64 = con.incr(NEXT_ID_KEY, 1).await?;

        let resource = Resource {
            id,
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

        con.set::<_, _, ()>(resource_key(id), encode(&resource)?)
            .await?;
        con.sadd::<_, _, ()>(hash_key(&resource.file_hash), id)
            .await?;
        con.zadd::<_, _, _, ()>(INDEX_KEY, id, id).await?;

        Ok(resource)
    }

    async fn get(&self, id: i64) -> Result<Option<Resource>, StoreError> {
        let mut con = self.con.clone();
        let json: Option<String> = con.get(resource_key(id)).await?;
        json.map(decode).transpose()
    }

    async fn list(&self, filter: &ResourceFilter) -> Result<Vec<Resource>, StoreError> {
        let mut con = self.con.clone();
        let mut resources = Vec::new();

        // Walk the whole index, highest id first, one page at a time
        let mut start: isize = 0;
        loop {
            let ids: Vec<i64> = con
                .zrevrange(INDEX_KEY, start, start + LIST_PAGE - 1)
                .await?;
            if ids.is_empty() {
                break;
            }

            let keys: Vec<String> = ids.iter().map(|id| resource_key(*id)).collect();
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut con)
                .await?;

            for (key, json) in keys.iter().zip(values) {
                let Some(data) = json else { continue };
                // Skip records that fail to parse rather than failing the whole listing
                match decode::<Resource>(data) {
                    Ok(resource) if filter.matches(&resource) => resources.push(resource),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(key = %key, error = %e, "Unreadable resource record"),
                }
            }

            if (ids.len() as isize) < LIST_PAGE {
                break;
            }
            start += LIST_PAGE;
        }

        sort_newest_first(&mut resources);
        Ok(resources)
    }

    async fn update_status(&self, id: i64, status: ResourceStatus) -> Result<bool, StoreError> {
        let mut con = self.con.clone();

        // Read-modify-write inside one script so concurrent reviews don't
        // clobber other fields
        let script = redis::Script::new(
            r#"
            local val = redis.call('GET', KEYS[1])
            if not val then
                return 0
            end
            local obj = cjson.decode(val)
            obj.status = ARGV[1]
            redis.call('SET', KEYS[1], cjson.encode(obj))
            return 1
            "#,
        );

        let updated: i32 = script
            .key(resource_key(id))
            .arg(status.as_str())
            .invoke_async(&mut con)
            .await?;

        Ok(updated == 1)
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Vec<Resource>, StoreError> {
        let mut con = self.con.clone();
        let mut ids: Vec<i64> = con.smembers(hash_key(hash)).await?;
        ids.sort_unstable();

        let mut resources = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(resource) = self.get(id).await? {
                resources.push(resource);
            }
        }
        Ok(resources)
    }
}
