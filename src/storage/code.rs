//! One-time code Redis operations.
//!
//! Redis key patterns:
//! - `code:{purpose}:{phone}` — live code (JSON) with its absolute expiry
//!
//! The Redis TTL only reclaims memory; validity is decided by the stored
//! `expires_at`, so a read never depends on key eviction timing.

use super::{decode, encode, CodeStore, StoreError};
use crate::models::{unix_now, Purpose};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroize;

fn code_key(key: &str, purpose: Purpose) -> String {
    format!("code:{}:{}", purpose.as_str(), key)
}

#[derive(Serialize, Deserialize)]
struct StoredCode {
    code: String,
    expires_at: u64,
    created_at: u64,
}

#[derive(Clone)]
pub struct RedisCodeStore {
    con: MultiplexedConnection,
}

impl RedisCodeStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        RedisCodeStore { con }
    }
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn save(
        &self,
        key: &str,
        code: &str,
        purpose: Purpose,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let redis_key = code_key(key, purpose);

        // Evict the previous code, then insert. Two commands, not one swap.
        con.del::<_, ()>(&redis_key).await?;

        let now = unix_now();
        let stored = StoredCode {
            code: code.to_string(),
            expires_at: now + ttl.as_secs(),
            created_at: now,
        };
        let mut json = encode(&stored)?;
        let result = con
            .set_ex::<_, _, ()>(&redis_key, &json, ttl.as_secs().max(1))
            .await;
        json.zeroize();
        result?;

        Ok(())
    }

    async fn get(&self, key: &str, purpose: Purpose) -> Result<Option<String>, StoreError> {
        let mut con = self.con.clone();
        let json: Option<String> = con.get(code_key(key, purpose)).await?;

        match json {
            Some(data) => {
                let mut stored: StoredCode = decode(data)?;
                if unix_now() > stored.expires_at {
                    stored.code.zeroize();
                    return Ok(None);
                }
                Ok(Some(stored.code))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str, purpose: Purpose) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        con.del::<_, ()>(code_key(key, purpose)).await?;
        Ok(())
    }
}
