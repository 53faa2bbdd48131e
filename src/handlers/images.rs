//! `GET /img/{key}`: on-demand resize and transcode.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{stream_response, BodyHeaders};
use crate::errors::ApiError;
use crate::images::{self, TransformParams};
use crate::metrics::record_transform;
use crate::storage::normalize_path;
use crate::AppState;

/// Raw transform query values; parsed leniently by [`TransformParams`].
#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub w: Option<String>,
    pub q: Option<String>,
    pub fmt: Option<String>,
}

/// `GET /img/{key}?w=&q=&fmt=`
#[utoipa::path(
    get,
    path = "/img/{key}",
    tag = "Images",
    operation_id = "GetImage",
    params(
        ("key" = String, Path, description = "Object key"),
        ("w" = Option<u32>, Query, description = "Target width, clamped to the configured maximum"),
        ("q" = Option<u8>, Query, description = "Quality 30-95"),
        ("fmt" = Option<String>, Query, description = "jpeg, png, webp, avif or auto"),
    ),
    responses(
        (status = 200, description = "Transformed image, or the original bytes for non-images"),
        (status = 400, description = "Missing key"),
        (status = 404, description = "Object not found"),
        (status = 500, description = "Transform failed")
    )
)]
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let key = normalize_path(&key);
    if key.is_empty() {
        return Err(ApiError::bad_request("missing key"));
    }

    let object = state
        .storage
        .stat(&key)
        .await?
        .ok_or_else(|| ApiError::not_found("not found"))?;
    let body = object.open().await?;

    if !images::is_transformable(&object.meta.content_type) {
        debug!("img passthrough: key={} type={}", key, object.meta.content_type);
        return Ok(stream_response(
            &key,
            body,
            BodyHeaders {
                content_type: &object.meta.content_type,
                cache_control: &object.meta.cache_control,
                content_length: Some(object.meta.size),
                vary_accept: true,
            },
        ));
    }

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let params = TransformParams::resolve(
        query.w.as_deref(),
        query.q.as_deref(),
        query.fmt.as_deref(),
        accept,
        &state.config.images,
    );
    debug!("img transform: key={} params={:?}", key, params);

    let source = images::read_source(body, state.config.images.max_source_bytes)
        .await
        .map_err(|e| {
            record_transform(params.format.label(), false);
            ApiError::TransformFailed(e)
        })?;
    let decoded = tokio::task::spawn_blocking(move || images::decode_and_resize(&source, params.width))
        .await
        .map_err(anyhow::Error::from)
        .and_then(|r| r)
        .map_err(|e| {
            record_transform(params.format.label(), false);
            ApiError::TransformFailed(e.context(format!("decode {key}")))
        })?;

    let encoded = images::encode_stream(decoded, params.format, params.quality);
    Ok(stream_response(
        &key,
        encoded,
        BodyHeaders {
            content_type: params.format.mime_type(),
            cache_control: &object.meta.cache_control,
            content_length: None,
            vary_accept: true,
        },
    ))
}

/// `GET /img/` with no key.
pub async fn missing_image_key() -> ApiError {
    ApiError::bad_request("missing key")
}
