//! Error types.
//!
//! [`StorageError`] is the storage facade's taxonomy: two startup-fatal
//! variants, an ordering error, and caller mistakes.  [`ApiError`] is what
//! handlers return; it implements [`axum::response::IntoResponse`] so a
//! handler can simply return `Err(ApiError::NotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Failures of the storage facade.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No credential source yielded a complete identity.
    #[error("storage credentials missing; set {} or provide a service account key file", .sources.join(" / "))]
    MissingCredentials { sources: Vec<&'static str> },

    /// The bucket handle was built but the reachability probe failed.
    #[error("storage bucket \"{bucket}\" is unreachable: {cause:#}")]
    StorageUnreachable {
        bucket: String,
        #[source]
        cause: anyhow::Error,
    },

    /// Storage was used before `init()` succeeded.
    #[error("storage accessed before initialization")]
    NotInitialized,

    /// The caller passed an empty buffer or path.
    #[error("{0}")]
    InvalidArgument(String),

    /// Any other failure reported by the backend.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Per-request HTTP errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed resource does not exist.
    #[error("{message}")]
    NotFound { message: String },

    /// The request was malformed.
    #[error("{message}")]
    BadRequest { message: String },

    /// The request body exceeded the upload limit.
    #[error("upload exceeds the maximum allowed size")]
    PayloadTooLarge,

    /// Image decode/resize failed before any response bytes were sent.
    #[error("transform failed")]
    TransformFailed(#[source] anyhow::Error),

    /// Storage has not finished initializing.
    #[error("storage not ready")]
    StorageNotReady,

    /// Catch-all for unexpected internal errors.
    #[error("failed")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Shorthand for a 404 with the given message.
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
        }
    }

    /// Shorthand for a 400 with the given message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { .. } => "NotFound",
            ApiError::BadRequest { .. } => "BadRequest",
            ApiError::PayloadTooLarge => "PayloadTooLarge",
            ApiError::TransformFailed(_) => "TransformFailed",
            ApiError::StorageNotReady => "StorageNotReady",
            ApiError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TransformFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::StorageNotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidArgument(message) => ApiError::BadRequest { message },
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::TransformFailed(cause) => tracing::error!("image transform failed: {cause:#}"),
            ApiError::Internal(cause) => tracing::error!("request failed: {cause:#}"),
            _ => {}
        }
        let body = serde_json::json!({ "error": self.to_string(), "code": self.code() });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_missing_credentials_names_sources() {
        let err = StorageError::MissingCredentials {
            sources: vec!["A_VAR", "B_VAR"],
        };
        let msg = err.to_string();
        assert!(msg.contains("A_VAR"));
        assert!(msg.contains("B_VAR"));
    }

    #[test]
    fn test_unreachable_includes_bucket_and_cause() {
        let err = StorageError::StorageUnreachable {
            bucket: "demo.appspot.com".to_string(),
            cause: anyhow::anyhow!("403 Forbidden"),
        };
        let msg = err.to_string();
        assert!(msg.contains("demo.appspot.com"));
        assert!(msg.contains("403 Forbidden"));
    }

    #[test]
    fn test_storage_error_mapping() {
        let api: ApiError = StorageError::InvalidArgument("empty buffer".into()).into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(api.to_string(), "empty buffer");

        let api: ApiError = StorageError::NotInitialized.into();
        assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::StorageNotReady.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::TransformFailed(anyhow::anyhow!("bad")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::TransformFailed(anyhow::anyhow!("bad")).to_string(), "transform failed");
    }
}
