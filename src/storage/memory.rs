//! In-memory storage backend.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>` together with
//! the metadata a remote bucket would report.  Used for local development
//! (`storage.backend: memory`) and throughout the test suite.

use bytes::Bytes;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backend::{
    BackendFuture, ByteStream, ObjectMetadata, PutOptions, StorageBackend,
};

/// Chunk size used when streaming an object back out.
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredEntry {
    data: Bytes,
    meta: ObjectMetadata,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// key -> stored bytes and metadata.
    objects: tokio::sync::RwLock<HashMap<String, StoredEntry>>,
    /// When set, `probe` fails; lets tests exercise the unreachable path.
    unreachable: AtomicBool,
}

impl MemoryBackend {
    /// Create an empty, reachable backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reachability probes fail (or succeed again).
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Compute the quoted MD5-hex ETag for a byte slice.
    fn compute_etag(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        format!("\"{}\"", hex::encode(hasher.finalize()))
    }
}

impl StorageBackend for MemoryBackend {
    fn probe(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if self.unreachable.load(Ordering::SeqCst) {
                anyhow::bail!("memory backend marked unreachable");
            }
            Ok(())
        })
    }

    fn put(&self, key: &str, data: Bytes, options: PutOptions) -> BackendFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let meta = ObjectMetadata::with_defaults(
                Some(options.content_type),
                Some(options.cache_control),
                data.len() as u64,
                Some(chrono::Utc::now().to_rfc3339()),
                Some(Self::compute_etag(&data)),
            );
            self.objects
                .write()
                .await
                .insert(key, StoredEntry { data, meta });
            Ok(())
        })
    }

    fn head(&self, key: &str) -> BackendFuture<'_, Option<ObjectMetadata>> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .objects
                .read()
                .await
                .get(&key)
                .map(|entry| entry.meta.clone()))
        })
    }

    fn open(&self, key: &str) -> BackendFuture<'_, ByteStream> {
        let key = key.to_string();
        Box::pin(async move {
            let data = self
                .objects
                .read()
                .await
                .get(&key)
                .map(|entry| entry.data.clone())
                .ok_or_else(|| anyhow::anyhow!("Object not found at storage key: {key}"))?;

            let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
                .step_by(READ_CHUNK)
                .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
                .collect();
            let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
            Ok(stream)
        })
    }

    fn delete(&self, key: &str) -> BackendFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.objects.write().await.remove(&key);
            Ok(())
        })
    }
}
