//! Object-storage side of the service.
//!
//! File bytes are written under `{id}/{file_name}` in one bucket. The bucket
//! is an S3 bucket, a directory (`storage_dir/{bucket}`) or process memory,
//! all behind `object_store::ObjectStore`.

use crate::{
    config::{AppConfig, BlobBackend},
    errors::StoreResult,
};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    ObjectStore, PutPayload, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory,
    path::Path,
};
use std::{fs, sync::Arc};
use tracing::{debug, info};

/// Capability the handlers need from the blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing anything already there.
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()>;

    /// Remove the object stored under `key`. A key that is already gone is
    /// not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

/// `BlobStore` over any `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreBlobs {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobs {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Build the backend selected by `cfg.blob_backend`.
    pub fn from_config(cfg: &AppConfig) -> StoreResult<Self> {
        let inner: Arc<dyn ObjectStore> = match cfg.blob_backend {
            BlobBackend::Local => {
                let root = cfg.storage_dir.join(&cfg.bucket_name);
                fs::create_dir_all(&root)?;
                info!("using local blob store at {}", root.display());
                Arc::new(LocalFileSystem::new_with_prefix(&root)?)
            }
            BlobBackend::S3 => {
                info!("using S3 bucket {}", cfg.bucket_name);
                Arc::new(
                    AmazonS3Builder::from_env()
                        .with_bucket_name(&cfg.bucket_name)
                        .build()?,
                )
            }
            BlobBackend::Memory => {
                info!("using in-memory blob store");
                Arc::new(InMemory::new())
            }
        };
        Ok(Self::new(inner))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn put(&self, key: &str, data: Bytes) -> StoreResult<()> {
        self.inner
            .put(&Path::from(key), PutPayload::from(data))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        // LocalFileSystem reports NotFound; InMemory and S3 do not.
        match self.inner.delete(&Path::from(key)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("blob {} already missing", key);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
