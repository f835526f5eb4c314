//! Byte storage for uploaded files.
//!
//! [`FileStorage`] is the seam between the intake pipeline and wherever the
//! bytes live. Two backends implement it: [`LocalStorage`] (a directory on
//! disk, served under `/uploads/`) and [`RemoteStorage`] (an HTTP object
//! store bucket). The backend is chosen once at startup from configuration.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use local::LocalStorage;
pub use remote::RemoteStorage;

/// Owned byte stream returned by [`FileStorage::get`].
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Error type for file storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote store error: {0}")]
    Remote(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Remote(err.to_string())
    }
}

/// Where an object landed and how many bytes were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist everything `reader` yields under `suggested_name`.
    ///
    /// The name must be a single clean path component; anything else fails
    /// with `InvalidKey` rather than being rewritten onto another key.
    async fn save(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        suggested_name: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Open a stored object. Fails with `NotFound` if the key is unknown.
    async fn get(&self, key: &str) -> Result<ByteStream, StorageError>;

    /// Public URL for a key. Pure, no I/O.
    fn public_url(&self, key: &str) -> String;
}

/// Reduce a name to its final path component.
///
/// `../../etc/passwd` becomes `passwd`. Names with no usable component
/// (empty, `.`, `..`, trailing separator) are rejected.
pub fn sanitize_key(name: &str) -> Result<String, StorageError> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if last.is_empty() || last == "." || last == ".." {
        return Err(StorageError::InvalidKey(name.to_string()));
    }
    Ok(last.to_string())
}

/// Accept `key` only if it is already a single clean path component.
///
/// Backends store and look up objects under exactly the key they are given;
/// a name that [`sanitize_key`] would rewrite is rejected instead.
pub fn checked_key(key: &str) -> Result<String, StorageError> {
    let clean = sanitize_key(key)?;
    if clean != key {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(clean)
}
