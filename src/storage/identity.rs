//! Identity Redis operations.
//!
//! Redis key patterns:
//! - `counter:identity` — last assigned identity id (INCR)
//! - `identity:{id}` — identity record (JSON, includes password hash)
//! - `identity_email:{email}` — email lookup to id (STRING, claimed with SET NX)
//! - `identity_phone:{phone}` — phone lookup to id (STRING, claimed with SET NX)
//!
//! Identity records are permanent: this service never deletes them.

use super::{decode, encode, IdentityStore, StoreError};
use crate::models::{unix_now, Identity, NewIdentity};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const NEXT_ID_KEY: &str = "counter:identity";

fn identity_key(id: i64) -> String {
    format!("identity:{}", id)
}

fn email_key(email: &str) -> String {
    format!("identity_email:{}", email)
}

fn phone_key(phone: &str) -> String {
    format!("identity_phone:{}", phone)
}

#[derive(Clone)]
pub struct RedisIdentityStore {
    con: MultiplexedConnection,
}

impl RedisIdentityStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        RedisIdentityStore { con }
    }

    async fn lookup(&self, index_key: &str) -> Result<Option<Identity>, StoreError> {
        let mut con = self.con.clone();
        let id: Option<i64> = con.get(index_key).await?;
        match id {
            Some(id) => self.get_by_id(id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl IdentityStore for RedisIdentityStore {
    async fn create(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut con = self.con.clone();
        let id: i64 = con.incr(NEXT_ID_KEY, 1).await?;

        // Claim the unique lookups first so two racing signups cannot both win
        if let Some(ref email) = new.email {
            let claimed: bool = con.set_nx(email_key(email), id).await?;
            if !claimed {
                return Err(StoreError::Conflict("email already registered".to_string()));
            }
        }
        if let Some(ref phone) = new.phone_number {
            let claimed: bool = con.set_nx(phone_key(phone), id).await?;
            if !claimed {
                if let Some(ref email) = new.email {
                    con.del::<_, ()>(email_key(email)).await?;
                }
                return Err(StoreError::Conflict("phone already registered".to_string()));
            }
        }

        let identity = Identity {
            id,
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

        con.set::<_, _, ()>(identity_key(id), encode(&identity)?)
            .await?;

        Ok(identity)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Identity>, StoreError> {
        let mut con = self.con.clone();
        let json: Option<String> = con.get(identity_key(id)).await?;
        json.map(decode).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.lookup(&email_key(email)).await
    }

    async fn get_by_phone(&self, phone: &str) -> Result<Option<Identity>, StoreError> {
        self.lookup(&phone_key(phone)).await
    }

    async fn update(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        con.set::<_, _, ()>(identity_key(identity.id), encode(identity)?)
            .await?;
        Ok(())
    }
}
