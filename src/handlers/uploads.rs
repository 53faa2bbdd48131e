//! Upload endpoint and the raw `/uploads` read path.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::form::MultipartForm;
use super::{stream_response, BodyHeaders};
use crate::errors::ApiError;
use crate::media::save_object;
use crate::metrics::record_upload_bytes;
use crate::AppState;

/// Optional `?prefix=` on the upload endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub prefix: Option<String>,
}

/// Body returned by `POST /api/upload`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub ok: bool,
    /// The object key.
    pub filename: String,
    /// `/uploads/{key}`.
    pub path: String,
    /// Absolute URL of `path`.
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

/// Reduce a caller-supplied folder prefix to `[A-Za-z0-9/_-]`.
///
/// Leading slashes go, every run of dots (plus any slashes right after it)
/// is dropped, then trailing slashes are trimmed.
pub fn sanitize_prefix(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.trim_start_matches('/').chars().peekable();
    while let Some(c) = chars.next() {
        if c == '.' {
            while matches!(chars.peek(), Some('.') | Some('/')) {
                chars.next();
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-') {
            out.push(c);
        }
    }
    out.trim_end_matches('/').to_string()
}

/// `POST /api/upload` -- store one file (form field `file`).
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "Uploads",
    operation_id = "UploadFile",
    params(
        ("prefix" = Option<String>, Query, description = "Folder to store the file under"),
    ),
    responses(
        (status = 200, description = "File stored"),
        (status = 400, description = "No file in the form"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Storage failure")
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::bad_request("no file"))?;

    let raw_prefix = query.prefix.or_else(|| form.text("prefix")).unwrap_or_default();
    let prefix = sanitize_prefix(&raw_prefix);
    let size = file.size();
    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| crate::storage::DEFAULT_CONTENT_TYPE.to_string());

    let saved = save_object(
        &state.storage,
        file.data,
        file.filename.as_deref(),
        Some(&content_type),
        &prefix,
    )
    .await?;
    record_upload_bytes(size);
    info!("upload stored: key={} size={}", saved.object_key, size);

    Ok(Json(UploadResponse {
        ok: true,
        url: format!("{}{}", state.config.public_base(), saved.public_path),
        filename: saved.object_key,
        path: saved.public_path,
        content_type,
        size,
    }))
}

/// `GET /uploads/{key}` -- stream a stored object unchanged.
#[utoipa::path(
    get,
    path = "/uploads/{key}",
    tag = "Uploads",
    operation_id = "GetUpload",
    params(
        ("key" = String, Path, description = "Object key"),
    ),
    responses(
        (status = 200, description = "Object bytes"),
        (status = 404, description = "Object not found")
    )
)]
pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let object = state
        .storage
        .stat(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))?;
    let body = object.open().await?;
    Ok(stream_response(
        &object.key,
        body,
        BodyHeaders {
            content_type: &object.meta.content_type,
            cache_control: &object.meta.cache_control,
            content_length: Some(object.meta.size),
            vary_accept: false,
        },
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_prefix() {
        assert_eq!(sanitize_prefix("foods"), "foods");
        assert_eq!(sanitize_prefix("/foods/"), "foods");
        assert_eq!(sanitize_prefix("banners/2024/"), "banners/2024");
        assert_eq!(sanitize_prefix("../../etc"), "etc");
        assert_eq!(sanitize_prefix("a/../b"), "a/b");
        assert_eq!(sanitize_prefix("we ird$name!"), "weirdname");
        assert_eq!(sanitize_prefix("Menu_Items-1"), "Menu_Items-1");
        assert_eq!(sanitize_prefix(""), "");
        assert_eq!(sanitize_prefix("///"), "");
    }
}
