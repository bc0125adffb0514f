//! Backends the handlers talk to, and the state that carries them.

pub mod blob_store;
pub mod metadata_store;

use crate::metrics::ApiMetrics;
use blob_store::BlobStore;
use metadata_store::MetadataStore;
use std::sync::Arc;

/// Shared state handed to every handler.
///
/// Built once at start-up; tests swap in fakes for either store.
#[derive(Clone)]
pub struct AppState {
    /// Relational store for health checks and file rows.
    pub metadata: Arc<dyn MetadataStore>,

    /// Object storage holding the uploaded bytes.
    pub blobs: Arc<dyn BlobStore>,

    /// Bucket name, the first segment of every stored `url`.
    pub bucket_name: String,

    pub metrics: Arc<ApiMetrics>,
}
