//! Remote object store backend.
//!
//! Objects live in a single bucket behind an HTTP endpoint. Every request
//! is signed with HMAC-SHA256 over `METHOD\n{x-date}\n/{bucket}/{key}`.
//!
//! Addressing:
//! - virtual-hosted (default): `{scheme}://{bucket}.{host}/{key}`
//! - path-style: `{scheme}://{host}/{bucket}/{key}`
//!
//! Public URLs are always virtual-hosted over https.

use super::{checked_key, ByteStream, FileStorage, StorageError, StoredObject};
use crate::models::unix_now;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use sha2::Sha256;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Connection settings for a remote bucket.
#[derive(Clone)]
pub struct RemoteOptions {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: Zeroizing<String>,
    pub path_style: bool,
}

impl std::fmt::Debug for RemoteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOptions")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[REDACTED]")
            .field("path_style", &self.path_style)
            .finish()
    }
}

pub struct RemoteStorage {
    client: reqwest::Client,
    scheme: String,
    host: String,
    options: RemoteOptions,
}

/// Split `https://host:port/` into (`https`, `host:port`). No scheme means https.
fn split_endpoint(endpoint: &str) -> (String, String) {
    let trimmed = endpoint.trim().trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, host)) => (scheme.to_ascii_lowercase(), host.to_string()),
        None => ("https".to_string(), trimmed.to_string()),
    }
}

impl RemoteStorage {
    pub fn new(options: RemoteOptions) -> Result<Self, StorageError> {
        let (scheme, host) = split_endpoint(&options.endpoint);
        if host.is_empty() {
            return Err(StorageError::Remote("empty endpoint".to_string()));
        }
        if options.bucket.is_empty() {
            return Err(StorageError::Remote("empty bucket".to_string()));
        }

        let client = reqwest::Client::builder().build()?;

        Ok(RemoteStorage {
            client,
            scheme,
            host,
            options,
        })
    }

    fn object_url(&self, key: &str) -> String {
        if self.options.path_style {
            format!("{}://{}/{}/{}", self.scheme, self.host, self.options.bucket, key)
        } else {
            format!("{}://{}.{}/{}", self.scheme, self.options.bucket, self.host, key)
        }
    }

    fn sign(&self, method: &str, date: &str, key: &str) -> Result<String, StorageError> {
        let mut mac = HmacSha256::new_from_slice(self.options.access_key_secret.as_bytes())
            .map_err(|e| StorageError::Remote(e.to_string()))?;
        mac.update(string_to_sign(method, date, &self.options.bucket, key).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn request(
        &self,
        method: reqwest::Method,
        key: &str,
    ) -> Result<reqwest::RequestBuilder, StorageError> {
        let date = unix_now().to_string();
        let signature = self.sign(method.as_str(), &date, key)?;

        Ok(self
            .client
            .request(method, self.object_url(key))
            .header("x-date", &date)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("HMAC {}:{}", self.options.access_key_id, signature),
            ))
    }
}

fn string_to_sign(method: &str, date: &str, bucket: &str, key: &str) -> String {
    format!("{}\n{}\n/{}/{}", method, date, bucket, key)
}

#[async_trait]
impl FileStorage for RemoteStorage {
    async fn save(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        suggested_name: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = checked_key(suggested_name)?;

        let mut body = Vec::new();
        reader.read_to_end(&mut body).await?;
        let size = body.len() as u64;

        let response = self
            .request(reqwest::Method::PUT, &key)?
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "PUT {} returned {}",
                key,
                response.status()
            )));
        }

        tracing::debug!(action = "remote_put", key = %key, size, "Object uploaded");
        Ok(StoredObject { key, size })
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StorageError> {
        let key = checked_key(key)?;
        let response = self.request(reqwest::Method::GET, &key)?.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key)),
            status if status.is_success() => {
                let bytes = response.bytes().await?;
                Ok(Box::new(Cursor::new(bytes)))
            }
            status => Err(StorageError::Remote(format!("GET {} returned {}", key, status))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}.{}/{}", self.options.bucket, self.host, key)
    }
}
