//! Resource intake pipeline.
//!
//! Uploads are hashed while they are written, so the recorded digest always
//! describes the persisted bytes. Stored keys are random (uuid + original
//! extension): identical content gets distinct objects, and duplicates are
//! surfaced through [`ResourceService::check_duplicate`] rather than rejected.

use crate::error::ServiceError;
use crate::files::{ByteStream, FileStorage};
use crate::models::{NewResource, Resource, ResourceFilter, ResourceInfo, ResourceStatus, UploadMeta};
use crate::storage::ResourceStore;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// AsyncRead adapter that feeds every byte it yields into SHA-256.
struct HashingReader<'a> {
    inner: &'a mut (dyn AsyncRead + Send + Unpin),
    hasher: Sha256,
}

impl<'a> HashingReader<'a> {
    fn new(inner: &'a mut (dyn AsyncRead + Send + Unpin)) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Lower-case hex digest of everything read so far.
    fn hex_digest(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl AsyncRead for HashingReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut *this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.hasher.update(&buf.filled()[before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// `.pdf` for `notes.pdf`. Empty when there is no extension or it is not
/// plain ASCII alphanumerics, so a client name can never add a separator.
fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn stored_key_for(original_name: &str) -> String {
    format!("{}{}", uuid::Uuid::new_v4(), extension_of(original_name))
}

pub struct ResourceService {
    resources: Arc<dyn ResourceStore>,
    storage: Arc<dyn FileStorage>,
}

impl ResourceService {
    pub fn new(resources: Arc<dyn ResourceStore>, storage: Arc<dyn FileStorage>) -> Self {
        Self { resources, storage }
    }

    fn with_url(&self, resource: Resource) -> ResourceInfo {
        let url = self.storage.public_url(&resource.filename);
        ResourceInfo { resource, url }
    }

    /// Persist an upload and record it as `PENDING`.
    ///
    /// If the metadata write fails after the bytes were stored, the object
    /// is left in place.
    pub async fn upload(
        &self,
        owner_id: Option<i64>,
        meta: UploadMeta,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        original_name: &str,
    ) -> Result<ResourceInfo, ServiceError> {
        let key = stored_key_for(original_name);

        let mut hashing = HashingReader::new(reader);
        let stored = self.storage.save(&mut hashing, &key).await?;
        let file_hash = hashing.hex_digest();

        let resource = self
            .resources
            .create(NewResource {
                owner_id,
                title: meta.title,
                description: meta.description,
                subject: meta.subject,
                resource_type: meta.resource_type,
                filename: stored.key,
                original_name: original_name.to_string(),
                size: stored.size,
                file_hash,
                status: ResourceStatus::Pending,
            })
            .await?;

        tracing::info!(
            action = "upload",
            resource_id = resource.id,
            owner_id = ?resource.owner_id,
            size = resource.size,
            hash = %resource.file_hash,
            "Resource uploaded"
        );
        Ok(self.with_url(resource))
    }

    /// Newest first. `search` is matched case-insensitively against title or description.
    pub async fn list(
        &self,
        status: Option<ResourceStatus>,
        search: Option<String>,
    ) -> Result<Vec<ResourceInfo>, ServiceError> {
        let filter = ResourceFilter { status, search };
        let resources = self.resources.list(&filter).await?;
        Ok(resources.into_iter().map(|r| self.with_url(r)).collect())
    }

    /// Metadata plus a stream over the stored bytes.
    pub async fn get_content(&self, id: i64) -> Result<(Resource, ByteStream), ServiceError> {
        let resource = self
            .resources
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("resource {}", id)))?;

        let stream = self.storage.get(&resource.filename).await?;
        Ok((resource, stream))
    }

    /// Set a review outcome. Overwrites any earlier outcome.
    pub async fn review(&self, id: i64, status: ResourceStatus) -> Result<(), ServiceError> {
        if !status.is_review_outcome() {
            return Err(ServiceError::InvalidInput(format!(
                "{} is not a review outcome",
                status
            )));
        }

        if !self.resources.update_status(id, status).await? {
            return Err(ServiceError::NotFound(format!("resource {}", id)));
        }

        tracing::info!(action = "review", resource_id = id, status = %status, "Resource reviewed");
        Ok(())
    }

    /// Every resource with this content hash. Empty means no duplicates.
    pub async fn check_duplicate(&self, hash: &str) -> Result<Vec<ResourceInfo>, ServiceError> {
        let resources = self.resources.find_by_hash(hash).await?;
        Ok(resources.into_iter().map(|r| self.with_url(r)).collect())
    }
}
