//! The storage facade.
//!
//! [`StorageContext`] is created once during startup, initialized once, and
//! then shared by reference with every request handler.  It owns the bucket
//! handle and funnels every key through [`normalize_path`] before it reaches
//! the backend.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::backend::{
    ByteStream, ObjectMetadata, PutOptions, StorageBackend, DEFAULT_CACHE_CONTROL,
    DEFAULT_CONTENT_TYPE,
};
use super::gcs::GcsBucket;
use super::memory::MemoryBackend;
use crate::config::StorageConfig;
use crate::credentials::resolve_credentials;
use crate::errors::StorageError;
use crate::metrics::record_storage_op;

/// Normalize a relative object path.
///
/// Strips leading slashes, drops empty, `.` and `..` segments, and rejoins
/// with `/`.  The result never escapes the bucket root and
/// `normalize_path(normalize_path(p)) == normalize_path(p)`.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Everything established by a successful `init()`.
struct Connected {
    bucket_name: String,
    backend: Arc<dyn StorageBackend>,
}

/// An object found by [`StorageContext::stat`].
pub struct StoredObject {
    /// Normalized key.
    pub key: String,
    /// Metadata as reported by storage.
    pub meta: ObjectMetadata,
    backend: Arc<dyn StorageBackend>,
}

impl StoredObject {
    /// Open a stream over the object's bytes.
    pub async fn open(&self) -> Result<ByteStream, StorageError> {
        Ok(self.backend.open(&self.key).await?)
    }
}

impl std::fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredObject")
            .field("key", &self.key)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Process-wide storage context.
pub struct StorageContext {
    config: StorageConfig,
    connected: OnceCell<Connected>,
}

// Credentials stay out of logs.
impl std::fmt::Debug for StorageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContext")
            .field("backend", &self.config.backend)
            .field("bucket", &self.connected.get().map(|c| c.bucket_name.as_str()))
            .field("initialized", &self.connected.initialized())
            .finish_non_exhaustive()
    }
}

impl StorageContext {
    /// Create an uninitialized context; call [`StorageContext::init`] before use.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            connected: OnceCell::new(),
        }
    }

    /// Create a context around an existing bucket handle.
    ///
    /// The reachability probe still runs; an unreachable backend fails with
    /// `StorageUnreachable` exactly as `init()` would.
    pub async fn with_backend(
        backend: Arc<dyn StorageBackend>,
        bucket_name: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let bucket_name = bucket_name.into();
        let connected = Self::probe(backend, bucket_name).await?;
        Ok(Self {
            config: StorageConfig::default(),
            connected: OnceCell::new_with(Some(connected)),
        })
    }

    /// Resolve credentials, build the bucket handle and probe it.
    ///
    /// Runs at most once; later calls after a success return immediately.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.connected
            .get_or_try_init(|| Self::connect(&self.config))
            .await?;
        Ok(())
    }

    async fn connect(config: &StorageConfig) -> Result<Connected, StorageError> {
        let (backend, bucket_name): (Arc<dyn StorageBackend>, String) =
            match config.backend.as_str() {
                "memory" => {
                    let name = if config.bucket.is_empty() {
                        "memory".to_string()
                    } else {
                        config.bucket.clone()
                    };
                    (Arc::new(MemoryBackend::new()), name)
                }
                _ => {
                    let creds = resolve_credentials(&config.credentials)?;
                    let name = if !config.bucket.is_empty() {
                        config.bucket.clone()
                    } else if let Some(ref named) = creds.bucket_name {
                        named.clone()
                    } else {
                        creds.default_bucket_name()
                    };
                    let project = creds.project_id.clone();
                    let bucket = GcsBucket::new(creds, name.clone(), &config.gcs).map_err(|e| {
                        StorageError::StorageUnreachable {
                            bucket: name.clone(),
                            cause: e,
                        }
                    })?;
                    info!("Storage project={} bucket={}", project, name);
                    (Arc::new(bucket), name)
                }
            };
        Self::probe(backend, bucket_name).await
    }

    async fn probe(
        backend: Arc<dyn StorageBackend>,
        bucket_name: String,
    ) -> Result<Connected, StorageError> {
        if let Err(cause) = backend.probe().await {
            return Err(StorageError::StorageUnreachable {
                bucket: bucket_name,
                cause,
            });
        }
        info!("Storage bucket \"{}\" reachable", bucket_name);
        Ok(Connected {
            bucket_name,
            backend,
        })
    }

    fn connected(&self) -> Result<&Connected, StorageError> {
        self.connected.get().ok_or(StorageError::NotInitialized)
    }

    /// Whether `init()` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.connected.initialized()
    }

    /// The effective bucket name.
    pub fn bucket_name(&self) -> Result<&str, StorageError> {
        Ok(&self.connected()?.bucket_name)
    }

    /// The cached bucket handle.
    pub fn bucket(&self) -> Result<Arc<dyn StorageBackend>, StorageError> {
        Ok(self.connected()?.backend.clone())
    }

    /// Store `data` at the normalized `path` and return the normalized key.
    pub async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
        cache_control: Option<&str>,
    ) -> Result<String, StorageError> {
        let key = normalize_path(path);
        if key.is_empty() {
            return Err(StorageError::InvalidArgument(
                "put requires a non-empty path".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(StorageError::InvalidArgument(
                "put requires a non-empty buffer".to_string(),
            ));
        }
        let backend = self.bucket()?;

        let options = PutOptions {
            content_type: content_type
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            cache_control: cache_control
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_CACHE_CONTROL)
                .to_string(),
        };
        debug!("storage put: key={} size={}", key, data.len());
        let result = backend.put(&key, data, options).await;
        record_storage_op("put", result.is_ok());
        result?;
        Ok(key)
    }

    /// Look up the object at the normalized `path`.
    ///
    /// Absence is `Ok(None)`, not an error.
    pub async fn stat(&self, path: &str) -> Result<Option<StoredObject>, StorageError> {
        let backend = self.bucket()?;
        let key = normalize_path(path);
        if key.is_empty() {
            return Ok(None);
        }
        let result = backend.head(&key).await;
        record_storage_op("stat", result.is_ok());
        Ok(result?.map(|meta| StoredObject { key, meta, backend }))
    }

    /// Delete the object at the normalized `path`.
    ///
    /// Missing objects are fine; any other failure is logged and swallowed.
    pub async fn delete(&self, path: &str) {
        let key = normalize_path(path);
        if key.is_empty() {
            return;
        }
        let backend = match self.bucket() {
            Ok(b) => b,
            Err(e) => {
                warn!("deleteObject skipped for {}: {}", key, e);
                return;
            }
        };
        let result = backend.delete(&key).await;
        record_storage_op("delete", result.is_ok());
        if let Err(e) = result {
            warn!("deleteObject failed for {}: {:#}", key, e);
        }
    }
}
