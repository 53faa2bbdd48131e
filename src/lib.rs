//! ricebox library: the backend of a small food ordering shop.
//!
//! The interesting part is the object storage layer: credential
//! resolution, a storage facade over a Cloud Storage bucket, object key
//! construction for uploads, and an on-demand image transform proxy.
//! Catalog CRUD routes sit on top of it.

use std::sync::Arc;

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod images;
pub mod media;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::catalog::CatalogStore;
use crate::config::Config;
use crate::storage::StorageContext;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Storage facade; initialized before the server starts accepting.
    pub storage: Arc<StorageContext>,
    /// Food and drink records.
    pub catalog: Arc<dyn CatalogStore>,
}
