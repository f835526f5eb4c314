//! Local filesystem backend.
//!
//! File structure:
//! - `{base_dir}/{key}` — uploaded bytes, flat (the key is a single path component)
//!
//! Public URLs are relative: `/uploads/{key}`, served by the router's
//! static file service.

use super::{checked_key, ByteStream, FileStorage, StorageError, StoredObject};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// URL prefix the router serves `base_dir` under.
pub const PUBLIC_PREFIX: &str = "/uploads/";

pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Create the backend, creating `base_dir` if it doesn't exist.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        Ok(LocalStorage { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.base_dir.join(checked_key(key)?))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    /// Uses atomic write (write to temp file, then rename) to prevent partial reads.
    async fn save(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        suggested_name: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = checked_key(suggested_name)?;
        let path = self.base_dir.join(&key);
        let temp_path = self.base_dir.join(format!("{}.tmp", key));

        let mut file = fs::File::create(&temp_path).await?;
        let size = tokio::io::copy(reader, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;

        Ok(StoredObject { key, size })
    }

    async fn get(&self, key: &str) -> Result<ByteStream, StorageError> {
        let path = self.object_path(key)?;

        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", PUBLIC_PREFIX, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_save_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();

        let mut content: &[u8] = b"test content";
        let stored = storage.save(&mut content, "abc.txt").await.unwrap();
        assert_eq!(stored.key, "abc.txt");
        assert_eq!(stored.size, 12);

        let mut reader = storage.get("abc.txt").await.unwrap();
        let mut read_back = Vec::new();
        reader.read_to_end(&mut read_back).await.unwrap();
        assert_eq!(read_back, b"test content");

        // No temp file left behind
        assert!(!temp_dir.path().join("abc.txt.tmp").exists());
    }

    #[tokio::test]
    async fn test_save_rejects_paths() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("uploads");
        let storage = LocalStorage::new(&base).await.unwrap();

        let mut existing: &[u8] = b"original";
        storage.save(&mut existing, "escape.txt").await.unwrap();

        for name in ["../escape.txt", "x.\\escape.txt", "sub/escape.txt"] {
            let mut content: &[u8] = b"overwrite";
            let result = storage.save(&mut content, name).await;
            assert!(matches!(result, Err(StorageError::InvalidKey(_))), "{}", name);
        }

        assert!(!temp_dir.path().join("escape.txt").exists());
        assert_eq!(std::fs::read(base.join("escape.txt")).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();

        let result = storage.get("nope.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_rejects_paths() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();

        let result = storage.get("../secret").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_public_url() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path()).await.unwrap();
        assert_eq!(storage.public_url("k.pdf"), "/uploads/k.pdf");
    }
}
