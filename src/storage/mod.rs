//! Object storage.
//!
//! The [`backend::StorageBackend`] trait abstracts over where bytes
//! physically live.  Implementations are a Google Cloud Storage bucket and
//! an in-memory map.  Request handlers never talk to a backend directly;
//! they go through the [`facade::StorageContext`].

pub mod backend;
pub mod facade;
pub mod gcs;
pub mod memory;

pub use backend::{
    ByteStream, ObjectMetadata, PutOptions, StorageBackend, DEFAULT_CACHE_CONTROL,
    DEFAULT_CONTENT_TYPE,
};
pub use facade::{normalize_path, StorageContext, StoredObject};
pub use gcs::GcsBucket;
pub use memory::MemoryBackend;
