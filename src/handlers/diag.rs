//! Welcome, health and diagnostic endpoints.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::form::MultipartForm;
use crate::errors::ApiError;
use crate::media::save_object;
use crate::AppState;

/// File field echoed by `/__diag/multipart`; catalog forms use the same name.
const ECHO_FILE_FIELD: &str = "imageFile";

/// Greeting returned by `GET /`.
pub const WELCOME: &str = "Welcome to ricebox";

fn bucket_name(state: &AppState) -> Option<&str> {
    state.storage.bucket_name().ok()
}

/// `GET /`
pub async fn welcome() -> Json<serde_json::Value> {
    Json(json!({ "message": WELCOME }))
}

/// `GET /healthz` -- Reports whether storage is ready and which bucket it uses.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health report")
    )
)]
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": state.storage.is_initialized(),
        "bucket": bucket_name(&state),
    }))
}

/// `GET /__diag/ping`
pub async fn ping(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    match bucket_name(&state) {
        Some(bucket) => Json(json!({ "ok": true, "bucket": bucket })),
        None => Json(json!({ "ok": false })),
    }
}

/// `GET /__diag/version`
pub async fn version(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "build": env!("CARGO_PKG_VERSION"),
        "bucket": bucket_name(&state),
        "publicBaseUrl": state.config.public_base(),
    }))
}

/// Midnight of `now`'s calendar day in its own zone, expressed in UTC.
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)?
        .and_local_timezone(now.timezone())
        .earliest()
        .map(|start| start.with_timezone(&Utc))
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `GET /__diag/time` -- server clock and the local start of today.
pub async fn time() -> Json<serde_json::Value> {
    let now = chrono::Local::now();
    let tz = std::env::var("TZ")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "system-default".to_string());
    Json(json!({
        "tz": tz,
        "nowISO": iso(now.with_timezone(&Utc)),
        "startOfTodayISO": start_of_day(&now).map(iso),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct HeadQuery {
    pub key: Option<String>,
}

/// `GET /__diag/gcs/head?key=` -- Does a stored key exist, and with what metadata.
#[utoipa::path(
    get,
    path = "/__diag/gcs/head",
    tag = "Diagnostics",
    operation_id = "HeadObject",
    params(("key" = String, Query, description = "Object key to look up")),
    responses(
        (status = 200, description = "Object exists"),
        (status = 400, description = "Missing key"),
        (status = 404, description = "Object not found")
    )
)]
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HeadQuery>,
) -> Result<Response, ApiError> {
    let key = query.key.unwrap_or_default();
    if key.is_empty() {
        return Err(ApiError::bad_request("missing ?key="));
    }
    Ok(match state.storage.stat(&key).await? {
        Some(object) => Json(json!({ "ok": true, "exists": true, "meta": object.meta }))
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "exists": false })),
        )
            .into_response(),
    })
}

/// `POST /__diag/multipart` -- echo the parsed form without storing anything.
pub async fn echo_multipart(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let file = form.file(ECHO_FILE_FIELD).map(|f| {
        json!({
            "fieldname": ECHO_FILE_FIELD,
            "originalname": f.filename,
            "mimetype": f.content_type,
            "size": f.size(),
            "hasBuffer": !f.data.is_empty(),
        })
    });
    Ok(Json(json!({ "fields": form.fields(), "file": file })))
}

/// `POST /__diag/upload` -- Store a file under `diagnostics/`.
pub async fn diag_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = MultipartForm::read(multipart, state.config.server.max_upload_bytes).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| ApiError::bad_request("no file"))?;
    let saved = save_object(
        &state.storage,
        file.data,
        file.filename.as_deref(),
        file.content_type.as_deref(),
        "diagnostics",
    )
    .await?;
    Ok(Json(json!({
        "saved": true,
        "filename": saved.object_key,
        "url": saved.public_path,
    })))
}
