//! Abstract storage backend trait.
//!
//! A [`StorageBackend`] is the bucket handle: every storage backend must
//! implement it.  Keys passed in are already normalized by the facade.
//! Reads hand back a byte stream so callers never need the whole object in
//! memory.

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Cache directive applied when nothing else is specified.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Content type applied when nothing else is specified.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A stream of object bytes.  Dropping it cancels the upstream read.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Metadata written alongside an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    pub cache_control: String,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
        }
    }
}

/// What storage reports about an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub content_type: String,
    pub cache_control: String,
    pub size: u64,
    /// RFC 3339 timestamp of the last write, when the backend reports one.
    pub updated_at: Option<String>,
    pub etag: Option<String>,
}

impl ObjectMetadata {
    /// Fill in defaults for fields the backend left empty.
    pub fn with_defaults(
        content_type: Option<String>,
        cache_control: Option<String>,
        size: u64,
        updated_at: Option<String>,
        etag: Option<String>,
    ) -> Self {
        Self {
            content_type: content_type
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            cache_control: cache_control
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_CACHE_CONTROL.to_string()),
            size,
            updated_at,
            etag,
        }
    }
}

/// Async bucket contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Cheap request proving the bucket exists and the credentials can read it.
    fn probe(&self) -> BackendFuture<'_, ()>;

    /// Write `data` to `key` in a single request.
    fn put(&self, key: &str, data: Bytes, options: PutOptions) -> BackendFuture<'_, ()>;

    /// Fetch metadata for `key`, or `None` when the object does not exist.
    fn head(&self, key: &str) -> BackendFuture<'_, Option<ObjectMetadata>>;

    /// Open a byte stream over the object at `key`.
    fn open(&self, key: &str) -> BackendFuture<'_, ByteStream>;

    /// Delete the object at `key`.  A missing object is not an error.
    fn delete(&self, key: &str) -> BackendFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults() {
        let meta = ObjectMetadata::with_defaults(None, Some(String::new()), 3, None, None);
        assert_eq!(meta.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(meta.cache_control, DEFAULT_CACHE_CONTROL);
        assert_eq!(meta.size, 3);
    }

    #[test]
    fn test_metadata_keeps_reported_values() {
        let meta = ObjectMetadata::with_defaults(
            Some("image/png".into()),
            Some("no-cache".into()),
            10,
            Some("2024-01-01T00:00:00Z".into()),
            Some("abc".into()),
        );
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.cache_control, "no-cache");
        assert_eq!(meta.etag.as_deref(), Some("abc"));
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let meta = ObjectMetadata::with_defaults(None, None, 1, None, None);
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("contentType").is_some());
        assert!(json.get("cacheControl").is_some());
        assert!(json.get("updatedAt").is_some());
    }
}
