//! Public resource endpoints: upload, listing, download.

use crate::auth::middleware::{AppState, AuthSession};
use crate::error::AppError;
use crate::files::ByteStream;
use crate::models::{ListQuery, ResourceStatus, UploadMeta};
use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::Stream;
use tokio::io::AsyncReadExt;

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// An uploaded file held in memory until the form is fully read.
struct FilePart {
    name: String,
    data: Bytes,
}

/// POST /api/public/resources — Upload one file or a group
///
/// Accepts multipart form with:
/// - "file" field (single upload) or repeated "files" fields (group upload)
/// - optional text fields "title", "description", "subject", "type"
///
/// Anonymous uploads are allowed. In a group upload an empty title falls
/// back to each file's name.
pub async fn upload(
    State(state): State<AppState>,
    session: Option<AuthSession>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let owner_id = session.map(|s| s.identity.id);

    let mut meta = UploadMeta::default();
    let mut single: Option<FilePart> = None;
    let mut group: Vec<FilePart> = Vec::new();

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
                let part = FilePart {
                    name: file_name,
                    data,
                };
                if name == "file" {
                    single = Some(part);
                } else {
                    group.push(part);
                }
            }
            "title" | "description" | "subject" | "type" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                match name.as_str() {
                    "title" => meta.title = value,
                    "description" => meta.description = value,
                    "subject" => meta.subject = value,
                    _ => meta.resource_type = value,
                }
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    if !group.is_empty() {
        let mut results = Vec::with_capacity(group.len());
        for part in group {
            let mut file_meta = meta.clone();
            if file_meta.title.is_empty() {
                file_meta.title = part.name.clone();
            }
            let mut reader: &[u8] = &part.data;
            results.push(
                state
                    .catalog
                    .upload(owner_id, file_meta, &mut reader, &part.name)
                    .await?,
            );
        }
        return Ok((StatusCode::CREATED, Json(results)).into_response());
    }

    let part = single.ok_or_else(|| AppError::BadRequest("file required".to_string()))?;
    let mut reader: &[u8] = &part.data;
    let info = state
        .catalog
        .upload(owner_id, meta, &mut reader, &part.name)
        .await?;

    Ok((StatusCode::CREATED, Json(info)).into_response())
}

/// GET /api/public/resources?q=&status= — List resources, newest first
pub async fn list(
    State(state): State<AppState>,
    _session: Option<AuthSession>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<ResourceStatus>().map_err(AppError::BadRequest)?),
    };
    let search = query.q.filter(|q| !q.is_empty());

    let resources = state.catalog.list(status, search).await?;
    Ok(Json(resources))
}

/// Chunked body over a stored object. Stops after the first read error.
fn body_stream(reader: ByteStream) -> impl Stream<Item = std::io::Result<Bytes>> {
    futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(e) => {
                tracing::warn!(action = "download_read", error = %e, "Stored object read failed");
                Some((Err(e), None))
            }
        }
    })
}

/// Quote-safe filename for Content-Disposition.
fn disposition_name(original: &str) -> String {
    original
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

/// GET /api/public/resources/{id}/download — Stream the stored bytes
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let (resource, reader) = state.catalog.get_content(id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    disposition_name(&resource.original_name)
                ),
            ),
            (header::CONTENT_LENGTH, resource.size.to_string()),
        ],
        Body::from_stream(body_stream(reader)),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_disposition_name() {
        assert_eq!(disposition_name("notes.pdf"), "notes.pdf");
        assert_eq!(disposition_name("a\"b.txt"), "a_b.txt");
        assert_eq!(disposition_name("x\r\ny"), "x__y");
    }

    #[tokio::test]
    async fn test_body_stream_chunks() {
        let data = vec![7u8; DOWNLOAD_CHUNK + 10];
        let reader: ByteStream = Box::new(std::io::Cursor::new(data.clone()));

        let chunks: Vec<Bytes> = body_stream(reader)
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
        assert_eq!(joined, data);
        assert!(chunks.len() >= 2);
    }
}
