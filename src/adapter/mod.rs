//! Filesystem adapter over a B2-style object store.
//!
//! Caller paths are mapped onto store keys under a fixed root prefix.
//! Directories are emulated with marker objects and delimiter listings,
//! moves are copy-then-delete, and attributes are projected from whatever
//! the store reports for the newest version of a name.

mod checksum;
pub mod directory;
pub mod error;
mod listing;
mod operations;
pub mod prefixer;
pub mod projector;
mod public_url;

use crate::{
    client::{ByteStream, ObjectStoreClient},
    config::{AdapterConfig, ConfigError},
    mime::{DefaultMimeTypeDetector, MimeTypeDetector},
    models::{
        attributes::{FileAttributes, StorageAttributes, Visibility},
        bucket::Bucket,
        options::{ChecksumOptions, CopyOptions, PublicUrlOptions, WriteOptions},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use prefixer::PathPrefixer;
use std::sync::Arc;
use tracing::info;

pub use error::{FilesystemError, FsResult, MetadataError, UrlError};

/// The contract consumed by a generic filesystem facade.
#[async_trait]
pub trait FilesystemAdapter: Send + Sync {
    async fn file_exists(&self, path: &str) -> FsResult<bool>;
    async fn directory_exists(&self, path: &str) -> FsResult<bool>;
    async fn write(&self, path: &str, contents: Bytes, options: WriteOptions) -> FsResult<()>;
    async fn write_stream(&self, path: &str, body: ByteStream, options: WriteOptions)
    -> FsResult<()>;
    async fn read(&self, path: &str) -> FsResult<Bytes>;
    async fn read_stream(&self, path: &str) -> FsResult<ByteStream>;
    async fn delete(&self, path: &str) -> FsResult<()>;
    async fn delete_directory(&self, path: &str) -> FsResult<()>;
    async fn create_directory(&self, path: &str) -> FsResult<()>;
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> FsResult<()>;
    async fn visibility(&self, path: &str) -> FsResult<FileAttributes>;
    async fn mime_type(&self, path: &str) -> FsResult<FileAttributes>;
    async fn last_modified(&self, path: &str) -> FsResult<FileAttributes>;
    async fn file_size(&self, path: &str) -> FsResult<FileAttributes>;
    fn list_contents(&self, path: &str, deep: bool)
    -> BoxStream<'_, FsResult<StorageAttributes>>;
    async fn move_file(&self, source: &str, destination: &str, options: CopyOptions)
    -> FsResult<()>;
    async fn copy_file(&self, source: &str, destination: &str, options: CopyOptions)
    -> FsResult<()>;
    async fn public_url(&self, path: &str, options: PublicUrlOptions) -> FsResult<String>;
    async fn checksum(&self, path: &str, options: ChecksumOptions) -> FsResult<String>;
}

/// Adapter bound to one bucket and root prefix.
///
/// Everything it holds is fixed at construction, so one instance can serve
/// concurrent callers as long as the client can.
#[derive(Clone)]
pub struct B2Adapter {
    client: Arc<dyn ObjectStoreClient>,
    bucket: Bucket,
    prefixer: PathPrefixer,
    detector: Arc<dyn MimeTypeDetector>,
    stream_reads: bool,
}

impl B2Adapter {
    /// Resolves the bucket and prefix, using the client's key restriction
    /// for whatever `config` leaves out.
    pub async fn connect(
        client: Arc<dyn ObjectStoreClient>,
        config: AdapterConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_detector(client, config, Arc::new(DefaultMimeTypeDetector)).await
    }

    pub async fn with_detector(
        client: Arc<dyn ObjectStoreClient>,
        config: AdapterConfig,
        detector: Arc<dyn MimeTypeDetector>,
    ) -> Result<Self, ConfigError> {
        let restriction = client.key_restriction().unwrap_or_default();

        let bucket_name = config
            .bucket
            .clone()
            .or_else(|| restriction.bucket_name.clone())
            .ok_or(ConfigError::BucketRequired)?;
        if let Some(allowed) = &restriction.bucket_name {
            if allowed != &bucket_name {
                return Err(ConfigError::BucketOutsideRestriction {
                    bucket: bucket_name,
                    allowed: allowed.clone(),
                });
            }
        }

        let prefix = config
            .prefix
            .clone()
            .or_else(|| restriction.name_prefix.clone())
            .unwrap_or_default();
        let prefixer =
            PathPrefixer::new(&prefix).map_err(|_| ConfigError::InvalidPrefix(prefix.clone()))?;

        let bucket = client
            .get_bucket_by_name(&bucket_name)
            .await
            .map_err(|source| ConfigError::BucketLookup {
                bucket: bucket_name.clone(),
                source,
            })?;

        info!(
            bucket = %bucket.name,
            prefix = %prefixer.prefix(),
            stream_reads = config.stream_reads,
            "adapter ready"
        );
        Ok(Self {
            client,
            bucket,
            prefixer,
            detector,
            stream_reads: config.stream_reads,
        })
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn prefixer(&self) -> &PathPrefixer {
        &self.prefixer
    }
}

#[async_trait]
impl FilesystemAdapter for B2Adapter {
    async fn file_exists(&self, path: &str) -> FsResult<bool> {
        B2Adapter::file_exists(self, path).await
    }

    async fn directory_exists(&self, path: &str) -> FsResult<bool> {
        B2Adapter::directory_exists(self, path).await
    }

    async fn write(&self, path: &str, contents: Bytes, options: WriteOptions) -> FsResult<()> {
        B2Adapter::write(self, path, contents, options).await
    }

    async fn write_stream(
        &self,
        path: &str,
        body: ByteStream,
        options: WriteOptions,
    ) -> FsResult<()> {
        B2Adapter::write_stream(self, path, body, options).await
    }

    async fn read(&self, path: &str) -> FsResult<Bytes> {
        B2Adapter::read(self, path).await
    }

    async fn read_stream(&self, path: &str) -> FsResult<ByteStream> {
        B2Adapter::read_stream(self, path).await
    }

    async fn delete(&self, path: &str) -> FsResult<()> {
        B2Adapter::delete(self, path).await
    }

    async fn delete_directory(&self, path: &str) -> FsResult<()> {
        B2Adapter::delete_directory(self, path).await
    }

    async fn create_directory(&self, path: &str) -> FsResult<()> {
        B2Adapter::create_directory(self, path).await
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> FsResult<()> {
        B2Adapter::set_visibility(self, path, visibility).await
    }

    async fn visibility(&self, path: &str) -> FsResult<FileAttributes> {
        B2Adapter::visibility(self, path).await
    }

    async fn mime_type(&self, path: &str) -> FsResult<FileAttributes> {
        B2Adapter::mime_type(self, path).await
    }

    async fn last_modified(&self, path: &str) -> FsResult<FileAttributes> {
        B2Adapter::last_modified(self, path).await
    }

    async fn file_size(&self, path: &str) -> FsResult<FileAttributes> {
        B2Adapter::file_size(self, path).await
    }

    fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> BoxStream<'_, FsResult<StorageAttributes>> {
        B2Adapter::list_contents(self, path, deep)
    }

    async fn move_file(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> FsResult<()> {
        B2Adapter::move_file(self, source, destination, options).await
    }

    async fn copy_file(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> FsResult<()> {
        B2Adapter::copy_file(self, source, destination, options).await
    }

    async fn public_url(&self, path: &str, options: PublicUrlOptions) -> FsResult<String> {
        B2Adapter::public_url(self, path, options).await
    }

    async fn checksum(&self, path: &str, options: ChecksumOptions) -> FsResult<String> {
        B2Adapter::checksum(self, path, options).await
    }
}
