//! Multipart form reading and lenient field parsing.
//!
//! Catalog forms come from browsers and admin tools that send every value
//! as text, so booleans and numbers are parsed forgivingly.

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use std::collections::HashMap;

use crate::errors::ApiError;

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A fully read multipart form.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

fn map_multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::bad_request(err.body_text())
    }
}

async fn read_file(field: Field<'_>, max_bytes: usize) -> Result<Bytes, ApiError> {
    let data = field.bytes().await.map_err(map_multipart_error)?;
    if data.len() > max_bytes {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(data)
}

impl MultipartForm {
    /// Read every part.  Parts with a filename are files, the rest are text.
    pub async fn read(
        multipart: Result<Multipart, MultipartRejection>,
        max_file_bytes: usize,
    ) -> Result<Self, ApiError> {
        let mut multipart =
            multipart.map_err(|e| ApiError::bad_request(format!("expected multipart form: {e}")))?;
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if field.file_name().is_some() {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = read_file(field, max_file_bytes).await?;
                form.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        content_type,
                        data,
                    },
                );
            } else {
                let text = field.text().await.map_err(map_multipart_error)?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// A text field, trimmed; empty values count as absent.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(|v| parse_bool(v))
    }

    pub fn number(&self, name: &str) -> Result<Option<f64>, ApiError> {
        match self.text(name) {
            None => Ok(None),
            Some(v) => parse_number(&v)
                .map(Some)
                .ok_or_else(|| ApiError::bad_request(format!("{name} must be a number"))),
        }
    }

    pub fn list(&self, name: &str) -> Option<Vec<String>> {
        self.fields.get(name).map(|v| parse_string_list(v))
    }

    /// Every text field as sent.
    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    /// A file part, including empty ones.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// Remove and return a non-empty file part.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name).filter(|f| !f.data.is_empty())
    }
}

/// `true`/`1` are true, `false`/`0` are false, anything else is false.
/// Empty input is "not given".
pub fn parse_bool(raw: &str) -> Option<bool> {
    let v = raw.trim();
    if v.is_empty() {
        return None;
    }
    Some(v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Parse a finite number, tolerating surrounding whitespace.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A JSON string array, or a comma-separated list as fallback.
pub fn parse_string_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
        return items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
