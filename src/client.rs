//! The object-store capability consumed by the adapter.
//!
//! Authentication, request signing, retries and connection handling all live
//! behind [`ObjectStoreClient`]. The adapter only needs the calls below and
//! a small error taxonomy it can translate into filesystem failures.

use crate::models::{
    bucket::Bucket,
    options::{ByteRange, MetadataDirective},
    stored_object::{LegalHold, Retention, ServerSideEncryption, StoredObject},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{collections::BTreeMap, io};
use thiserror::Error;

/// Object content as a stream of chunks.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("object store failure: {0}")]
    Backend(String),
}

impl ClientError {
    /// True when the store reported the object or bucket as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::ObjectNotFound(_) | ClientError::BucketNotFound(_)
        )
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Scope of the credentials the client was authorized with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRestriction {
    pub bucket_id: Option<String>,
    pub bucket_name: Option<String>,
    pub name_prefix: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListObjectsRequest {
    pub bucket_id: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    /// Only names strictly after this one are returned.
    pub start_after: Option<String>,
    /// Upper bound on the number of entries the stream yields.
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct PutObjectRequest {
    pub bucket_id: String,
    pub key: String,
    /// `None` lets the store decide.
    pub content_type: Option<String>,
    pub file_info: BTreeMap<String, String>,
    pub legal_hold: Option<LegalHold>,
    pub retention: Option<Retention>,
    pub server_side_encryption: Option<ServerSideEncryption>,
}

#[derive(Clone, Debug, Default)]
pub struct CopyObjectRequest {
    /// File version id of the source.
    pub source_id: String,
    pub destination_key: String,
    /// Defaults to the source's bucket.
    pub destination_bucket_id: Option<String>,
    pub range: Option<ByteRange>,
    pub metadata_directive: MetadataDirective,
    pub retention: Option<Retention>,
    pub legal_hold: Option<LegalHold>,
    pub source_server_side_encryption: Option<ServerSideEncryption>,
    pub destination_server_side_encryption: Option<ServerSideEncryption>,
}

/// Low-level access to a versioned, key-addressed object store.
///
/// Implementations must tolerate concurrent calls from several adapter
/// operations at once.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Newest visible version stored under `key`.
    async fn get_object_by_name(&self, bucket_id: &str, key: &str) -> ClientResult<StoredObject>;

    /// Lazily paginated listing. Pagination is internal to the stream.
    fn list_objects(&self, request: ListObjectsRequest) -> BoxStream<'_, ClientResult<StoredObject>>;

    /// Uploads a new version. Never mutates existing versions.
    async fn put_object(
        &self,
        request: PutObjectRequest,
        body: ByteStream,
    ) -> ClientResult<StoredObject>;

    async fn get_object_content(&self, object_id: &str) -> ClientResult<ByteStream>;

    /// Removes exactly one version.
    async fn delete_object_version(&self, object_id: &str, key: &str) -> ClientResult<()>;

    /// Server-side copy of a version into a new version.
    async fn copy_object(&self, request: CopyObjectRequest) -> ClientResult<StoredObject>;

    async fn get_bucket_by_name(&self, name: &str) -> ClientResult<Bucket>;

    async fn list_buckets(&self) -> ClientResult<Vec<Bucket>>;

    /// Direct download URL. `authorized` appends the account credential.
    fn get_download_url(&self, key: &str, bucket_name: &str, authorized: bool) -> String;

    /// Time-limited credential valid for names starting with `key_prefix`.
    async fn get_download_authorization(
        &self,
        bucket_id: &str,
        key_prefix: &str,
        duration_secs: u64,
    ) -> ClientResult<String>;

    /// Restrictions of the credentials in use, if any.
    fn key_restriction(&self) -> Option<KeyRestriction> {
        None
    }
}
