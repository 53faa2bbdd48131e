//! HTTP handlers.
//!
//! Each submodule owns one group of routes; [`crate::server::app`] wires
//! them together.

pub mod catalog;
pub mod diag;
pub mod form;
pub mod images;
pub mod uploads;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use tracing::error;

use crate::storage::{ByteStream, DEFAULT_CACHE_CONTROL, DEFAULT_CONTENT_TYPE};

/// Headers describing an object body.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyHeaders<'a> {
    pub content_type: &'a str,
    pub cache_control: &'a str,
    pub content_length: Option<u64>,
    pub vary_accept: bool,
}

/// Stream `body` back with object headers.
///
/// Upstream read errors are logged and end the body abruptly; the status
/// line has already been sent by then.
pub(crate) fn stream_response(key: &str, body: ByteStream, headers: BodyHeaders<'_>) -> Response {
    let key = key.to_string();
    let body = body.inspect_err(move |e| error!("stream error for {}: {}", key, e));
    let mut response = (StatusCode::OK, Body::from_stream(body)).into_response();
    let hdrs = response.headers_mut();

    hdrs.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(headers.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
    );
    hdrs.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(headers.cache_control)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CACHE_CONTROL)),
    );
    if let Some(len) = headers.content_length {
        hdrs.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    if headers.vary_accept {
        hdrs.insert(header::VARY, HeaderValue::from_static("Accept"));
    }
    response
}
