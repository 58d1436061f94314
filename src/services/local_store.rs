//! src/services/local_store.rs
//!
//! LocalObjectStore — a B2-semantics object store backed by SQLite for
//! version metadata and local disk for payloads. Every upload is a new
//! version with its own file id; payloads are sharded beneath
//! `base_path/{bucket_id}/{shard}/{shard}/{file_id}`.

use crate::{
    client::{
        ByteStream, ClientError, ClientResult, CopyObjectRequest, KeyRestriction,
        ListObjectsRequest, ObjectStoreClient, PutObjectRequest,
    },
    models::{
        bucket::{Bucket, BucketType},
        multipart::LargeFilePart,
        options::MetadataDirective,
        stored_object::{ActionType, EncryptionMode, LegalHold, StoredObject},
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, TryStreamExt, pin_mut, stream, stream::BoxStream};
use sha1::{Digest, Sha1};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("file version `{0}` not found")]
    FileVersionNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("access denied: {0}")]
    Unauthorized(String),
    #[error("`{0}` is protected by a legal hold or retention period")]
    ObjectLocked(String),
    #[error("corrupt metadata: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BucketNotFound(bucket) => ClientError::BucketNotFound(bucket),
            StorageError::ObjectNotFound { key, .. } => ClientError::ObjectNotFound(key),
            StorageError::FileVersionNotFound(id) => ClientError::ObjectNotFound(id),
            StorageError::Io(err) => ClientError::Io(err),
            err @ (StorageError::Unauthorized(_) | StorageError::ObjectLocked(_)) => {
                ClientError::Unauthorized(err.to_string())
            }
            err @ (StorageError::BucketAlreadyExists(_)
            | StorageError::InvalidBucketName { .. }
            | StorageError::InvalidObjectKey
            | StorageError::InvalidRequest(_)) => ClientError::InvalidRequest(err.to_string()),
            err @ (StorageError::Corrupt(_) | StorageError::Sqlx(_)) => {
                ClientError::Backend(err.to_string())
            }
        }
    }
}

/// One row of `file_versions`.
#[derive(FromRow, Debug)]
struct VersionRow {
    id: String,
    bucket_id: String,
    file_name: String,
    action: ActionType,
    content_length: i64,
    content_type: Option<String>,
    content_md5: Option<String>,
    content_sha1: Option<String>,
    file_info: String,
    legal_hold: Option<String>,
    retention: Option<String>,
    server_side_encryption: Option<String>,
    upload_timestamp: i64,
}

impl TryFrom<VersionRow> for StoredObject {
    type Error = StorageError;

    fn try_from(row: VersionRow) -> StorageResult<Self> {
        Ok(StoredObject {
            id: Some(row.id),
            bucket_id: row.bucket_id,
            key: row.file_name,
            size: row.content_length.max(0) as u64,
            upload_timestamp: row.upload_timestamp,
            content_type: row.content_type,
            action: row.action,
            content_md5: row.content_md5,
            content_sha1: row.content_sha1,
            file_info: serde_json::from_str(&row.file_info)?,
            legal_hold: decode_json(row.legal_hold)?,
            retention: decode_json(row.retention)?,
            server_side_encryption: decode_json(row.server_side_encryption)?,
        })
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> StorageResult<Option<T>> {
    raw.map(|value| serde_json::from_str(&value))
        .transpose()
        .map_err(StorageError::from)
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> StorageResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

/// Size and digests computed while a payload is written.
struct PayloadDigest {
    size: u64,
    md5: String,
    sha1: String,
}

/// Cursor state of a paginated listing.
struct ListState {
    after: Option<String>,
    last_folder: Option<String>,
    done: bool,
}

const VERSION_COLUMNS: &str = "id, bucket_id, file_name, action, content_length, content_type, \
     content_md5, content_sha1, file_info, legal_hold, retention, server_side_encryption, \
     upload_timestamp";

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 6;
const BUCKET_NAME_MAX_LEN: usize = 50;
const DEFAULT_PAGE_SIZE: usize = 1000;
const MAX_AUTHORIZATION_SECS: u64 = 7 * 24 * 60 * 60;

/// LocalObjectStore provides the object-store calls the adapter consumes:
/// - versioned uploads (new file id per upload, MD5 and SHA1 computed while streaming)
/// - newest-version lookup by name, with hide markers masking older versions
/// - paginated, prefix/delimiter-scoped listings
/// - server-side copy, version deletes honoring legal holds and retention
/// - download URLs and time-limited download authorizations
#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    /// Base of generated download URLs, without trailing slash.
    pub public_base_url: String,

    account_token: String,
    page_size: usize,
    restriction: Option<KeyRestriction>,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            account_token: new_token(),
            page_size: DEFAULT_PAGE_SIZE,
            restriction: None,
        }
    }

    /// Number of rows fetched per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pretend the credentials are restricted to a bucket and name prefix.
    pub fn with_restriction(mut self, restriction: KeyRestriction) -> Self {
        self.restriction = Some(restriction);
        self
    }

    /// Credential that authorizes every download.
    pub fn account_token(&self) -> &str {
        &self.account_token
    }

    /// Apply the embedded schema statement by statement.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements...", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Basic key validation.
    ///
    /// Rejects empty or oversized keys, keys beginning with `/`, `..`
    /// segments and control characters.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.chars().any(|c| c.is_control()) {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// - 6–50 characters
    /// - letters, digits and hyphens only
    /// - cannot start with the reserved `b2-` prefix
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 6 and 50 characters"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(invalid("allowed characters are letters, digits, and hyphens"));
        }
        if name.to_ascii_lowercase().starts_with("b2-") {
            return Err(invalid("the `b2-` prefix is reserved"));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_id: &str) -> PathBuf {
        self.base_path.join(bucket_id)
    }

    /// Two-level shard identifiers from MD5(bucket/file id), as lowercase hex.
    fn object_shards(bucket_id: &str, file_id: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_id, file_id));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/bucket_id/{shard}/{shard}/{file_id}. Parents may not exist yet.
    fn object_path(&self, bucket_id: &str, file_id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_id, file_id);
        let mut path = self.bucket_root(bucket_id);
        path.push(shard_a);
        path.push(shard_b);
        path.push(file_id);
        path
    }

    fn part_path(&self, file_id: &str, part_number: i64) -> PathBuf {
        self.base_path
            .join(".parts")
            .join(file_id)
            .join(part_number.to_string())
    }

    // --- Buckets ---

    /// Create a bucket. Returns BucketAlreadyExists on a name conflict.
    pub async fn create_bucket(&self, name: &str, bucket_type: BucketType) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        let bucket = Bucket {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            bucket_type,
            created_at: Utc::now(),
        };

        match sqlx::query(
            "INSERT INTO buckets (id, name, bucket_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&bucket.id)
        .bind(&bucket.name)
        .bind(bucket.bucket_type)
        .bind(bucket.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {
                fs::create_dir_all(self.bucket_root(&bucket.id)).await?;
                Ok(bucket)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Existing bucket with this name, or a newly created one.
    pub async fn ensure_bucket(&self, name: &str, bucket_type: BucketType) -> StorageResult<Bucket> {
        match self.fetch_bucket(name).await {
            Ok(bucket) => Ok(bucket),
            Err(StorageError::BucketNotFound(_)) => self.create_bucket(name, bucket_type).await,
            Err(err) => Err(err),
        }
    }

    /// Switch a bucket between public and private.
    pub async fn update_bucket_type(
        &self,
        name: &str,
        bucket_type: BucketType,
    ) -> StorageResult<Bucket> {
        let result = sqlx::query("UPDATE buckets SET bucket_type = ? WHERE name = ?")
            .bind(bucket_type)
            .bind(name)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }
        self.fetch_bucket(name).await
    }

    pub async fn fetch_bucket(&self, name: &str) -> StorageResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, bucket_type, created_at FROM buckets WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
    }

    async fn fetch_bucket_by_id(&self, id: &str) -> StorageResult<Bucket> {
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, bucket_type, created_at FROM buckets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::BucketNotFound(id.to_string()))
    }

    // --- Versions ---

    async fn fetch_version(&self, file_id: &str) -> StorageResult<VersionRow> {
        sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {} FROM file_versions WHERE id = ?",
            VERSION_COLUMNS
        ))
        .bind(file_id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::FileVersionNotFound(file_id.to_string()))
    }

    /// Newest upload or hide version of a name. Unfinished large files are
    /// skipped; a hide marker reads as not found.
    async fn fetch_current(&self, bucket_id: &str, key: &str) -> StorageResult<VersionRow> {
        let row = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {} FROM file_versions
             WHERE bucket_id = ? AND file_name = ? AND action IN ('upload', 'hide')
             ORDER BY seq DESC LIMIT 1",
            VERSION_COLUMNS
        ))
        .bind(bucket_id)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) if row.action == ActionType::Upload => Ok(row),
            _ => Err(StorageError::ObjectNotFound {
                bucket: bucket_id.to_string(),
                key: key.to_string(),
            }),
        }
    }

    async fn insert_version(&self, object: &StoredObject) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO file_versions (
                id, bucket_id, file_name, action, content_length, content_type,
                content_md5, content_sha1, file_info, legal_hold, retention,
                server_side_encryption, upload_timestamp
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&object.id)
        .bind(&object.bucket_id)
        .bind(&object.key)
        .bind(object.action)
        .bind(object.size as i64)
        .bind(&object.content_type)
        .bind(&object.content_md5)
        .bind(&object.content_sha1)
        .bind(serde_json::to_string(&object.file_info)?)
        .bind(encode_json(&object.legal_hold)?)
        .bind(encode_json(&object.retention)?)
        .bind(encode_json(&object.server_side_encryption)?)
        .bind(object.upload_timestamp)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Stream a payload to disk.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes size, MD5 and SHA1 while streaming.
    /// - Renames into the final location after fsync.
    ///
    /// Cleans up the temp file on errors.
    async fn write_payload<S>(&self, final_path: &Path, stream: S) -> StorageResult<PayloadDigest>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "payload path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut md5_digest = md5::Context::new();
        let mut sha1_digest = Sha1::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size += chunk.len() as u64;
            md5_digest.consume(&chunk);
            sha1_digest.update(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, final_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(final_path).await?;
                fs::rename(&tmp_path, final_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        Ok(PayloadDigest {
            size,
            md5: format!("{:x}", md5_digest.compute()),
            sha1: hex::encode(sha1_digest.finalize()),
        })
    }

    /// Upload a new version of `request.key`.
    ///
    /// The payload is written first; the metadata row only appears once the
    /// payload is durable, so a failed upload leaves no visible version.
    pub async fn upload_version<S>(
        &self,
        request: PutObjectRequest,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(&request.key)?;
        let bucket = self.fetch_bucket_by_id(&request.bucket_id).await?;

        let file_id = new_file_id();
        let file_path = self.object_path(&bucket.id, &file_id);
        let digest = self.write_payload(&file_path, stream).await?;

        let content_type = resolve_content_type(&request.key, request.content_type);
        let object = StoredObject {
            id: Some(file_id),
            bucket_id: bucket.id,
            key: request.key,
            size: digest.size,
            upload_timestamp: Utc::now().timestamp_millis(),
            content_type: Some(content_type),
            action: ActionType::Upload,
            content_md5: Some(digest.md5),
            content_sha1: Some(digest.sha1),
            file_info: request.file_info,
            legal_hold: request.legal_hold,
            retention: request.retention,
            server_side_encryption: request
                .server_side_encryption
                .map(|sse| sse.redacted()),
        };

        if let Err(err) = self.insert_version(&object).await {
            let _ = fs::remove_file(&file_path).await;
            return Err(err);
        }
        debug!(key = %object.key, size = object.size, "stored new version");
        Ok(object)
    }

    /// Hide a name: inserts a `hide` version that masks older ones.
    pub async fn hide_object(&self, bucket_id: &str, key: &str) -> StorageResult<StoredObject> {
        self.fetch_current(bucket_id, key).await?;
        let object = StoredObject {
            id: Some(new_file_id()),
            action: ActionType::Hide,
            upload_timestamp: Utc::now().timestamp_millis(),
            ..StoredObject::folder(bucket_id, key)
        };
        self.insert_version(&object).await?;
        Ok(object)
    }

    /// Start a large file. It stays a `start` version until finished.
    pub async fn start_large_object(
        &self,
        request: PutObjectRequest,
    ) -> StorageResult<StoredObject> {
        self.ensure_key_safe(&request.key)?;
        let bucket = self.fetch_bucket_by_id(&request.bucket_id).await?;
        let content_type = resolve_content_type(&request.key, request.content_type);
        let object = StoredObject {
            id: Some(new_file_id()),
            bucket_id: bucket.id,
            key: request.key,
            size: 0,
            upload_timestamp: Utc::now().timestamp_millis(),
            content_type: Some(content_type),
            action: ActionType::Start,
            content_md5: None,
            content_sha1: None,
            file_info: request.file_info,
            legal_hold: request.legal_hold,
            retention: request.retention,
            server_side_encryption: request
                .server_side_encryption
                .map(|sse| sse.redacted()),
        };
        self.insert_version(&object).await?;
        Ok(object)
    }

    /// Upload one part of an unfinished large file. Re-uploading a part
    /// number replaces it.
    pub async fn upload_part<S>(
        &self,
        file_id: &str,
        part_number: i64,
        stream: S,
    ) -> StorageResult<LargeFilePart>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let row = self.fetch_version(file_id).await?;
        if row.action != ActionType::Start {
            return Err(StorageError::InvalidRequest(format!(
                "file `{}` is not an unfinished large file",
                file_id
            )));
        }
        if part_number < 1 {
            return Err(StorageError::InvalidRequest(
                "part numbers start at 1".into(),
            ));
        }

        let digest = self
            .write_payload(&self.part_path(file_id, part_number), stream)
            .await?;
        let part = LargeFilePart {
            file_id: file_id.to_string(),
            part_number,
            size_bytes: digest.size as i64,
            content_sha1: digest.sha1,
            uploaded_at: Utc::now(),
        };
        sqlx::query(
            "INSERT OR REPLACE INTO large_file_parts
                (file_id, part_number, size_bytes, content_sha1, uploaded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&part.file_id)
        .bind(part.part_number)
        .bind(part.size_bytes)
        .bind(&part.content_sha1)
        .bind(part.uploaded_at)
        .execute(&*self.db)
        .await?;
        Ok(part)
    }

    /// Concatenate the parts into the final payload.
    ///
    /// The store does not hash large files end to end, so the finished
    /// version reports neither MD5 nor SHA1.
    pub async fn finish_large_object(&self, file_id: &str) -> StorageResult<StoredObject> {
        let row = self.fetch_version(file_id).await?;
        if row.action != ActionType::Start {
            return Err(StorageError::InvalidRequest(format!(
                "file `{}` is not an unfinished large file",
                file_id
            )));
        }
        let parts = sqlx::query_as::<_, LargeFilePart>(
            "SELECT file_id, part_number, size_bytes, content_sha1, uploaded_at
             FROM large_file_parts WHERE file_id = ? ORDER BY part_number ASC",
        )
        .bind(file_id)
        .fetch_all(&*self.db)
        .await?;
        if parts.is_empty() {
            return Err(StorageError::InvalidRequest(
                "a large file needs at least one part".into(),
            ));
        }

        let part_paths: Vec<PathBuf> = parts
            .iter()
            .map(|part| self.part_path(file_id, part.part_number))
            .collect();
        let joined = stream::iter(part_paths)
            .then(|path| async move { File::open(path).await.map(ReaderStream::new) })
            .try_flatten();
        let final_path = self.object_path(&row.bucket_id, file_id);
        let digest = self.write_payload(&final_path, joined).await?;

        sqlx::query(
            "UPDATE file_versions
             SET action = 'upload', content_length = ?, content_md5 = NULL, content_sha1 = 'none'
             WHERE id = ?",
        )
        .bind(digest.size as i64)
        .bind(file_id)
        .execute(&*self.db)
        .await?;
        self.discard_parts(file_id).await?;

        self.fetch_version(file_id).await?.try_into()
    }

    async fn discard_parts(&self, file_id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM large_file_parts WHERE file_id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        let dir = self.base_path.join(".parts").join(file_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Fetch one page of a listing and advance the cursor.
    ///
    /// Only the newest version of each name is considered. With a delimiter,
    /// uploaded names continuing past it collapse into one folder entry; the names of
    /// one folder are contiguous in key order, so remembering the last
    /// folder is enough to suppress duplicates across pages.
    async fn fetch_page(
        &self,
        request: &ListObjectsRequest,
        state: &mut ListState,
    ) -> StorageResult<Vec<StoredObject>> {
        let rows = sqlx::query_as::<_, VersionRow>(&format!(
            "SELECT {} FROM file_versions v
             WHERE v.bucket_id = ?
               AND substr(v.file_name, 1, ?) = ?
               AND v.file_name > ?
               AND v.seq = (SELECT MAX(w.seq) FROM file_versions w
                            WHERE w.bucket_id = v.bucket_id AND w.file_name = v.file_name)
             ORDER BY v.file_name ASC
             LIMIT ?",
            VERSION_COLUMNS
        ))
        .bind(&request.bucket_id)
        .bind(request.prefix.chars().count() as i64)
        .bind(&request.prefix)
        .bind(state.after.as_deref().unwrap_or(""))
        .bind(self.page_size as i64)
        .fetch_all(&*self.db)
        .await?;

        if rows.len() < self.page_size {
            state.done = true;
        }
        if let Some(last) = rows.last() {
            state.after = Some(last.file_name.clone());
        }

        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(delimiter) = request.delimiter.as_deref().filter(|d| !d.is_empty()) {
                if let Some(folder) =
                    compute_common_prefix(&row.file_name, Some(request.prefix.as_str()), delimiter)
                {
                    // Hidden and unfinished names never make a folder appear.
                    if !matches!(row.action, ActionType::Upload | ActionType::Folder) {
                        continue;
                    }
                    if state.last_folder.as_deref() != Some(folder.as_str()) {
                        page.push(StoredObject::folder(&request.bucket_id, folder.clone()));
                        state.last_folder = Some(folder);
                    }
                    continue;
                }
            }
            page.push(row.try_into()?);
        }
        Ok(page)
    }

    /// Copy a version server-side into a new version.
    pub async fn copy_version(&self, request: CopyObjectRequest) -> StorageResult<StoredObject> {
        let source = self.fetch_version(&request.source_id).await?;
        if source.action != ActionType::Upload {
            return Err(StorageError::FileVersionNotFound(request.source_id));
        }
        let source: StoredObject = source.try_into()?;
        self.ensure_key_safe(&request.destination_key)?;

        let destination_bucket = match request.destination_bucket_id.as_deref() {
            Some(id) => self.fetch_bucket_by_id(id).await?,
            None => self.fetch_bucket_by_id(&source.bucket_id).await?,
        };

        if let Some(sse) = &source.server_side_encryption {
            if sse.mode == EncryptionMode::Customer
                && request
                    .source_server_side_encryption
                    .as_ref()
                    .and_then(|given| given.customer_key.as_ref())
                    .is_none()
            {
                return Err(StorageError::Unauthorized(
                    "source is encrypted with a customer key that was not provided".into(),
                ));
            }
        }

        let source_id = source.id.clone().unwrap_or_default();
        let mut file = File::open(self.object_path(&source.bucket_id, &source_id)).await?;
        let body: ByteStream = match request.range {
            Some(range) => {
                if range.is_empty() || range.end >= source.size {
                    return Err(StorageError::InvalidRequest(format!(
                        "range {} outside of {} bytes",
                        range, source.size
                    )));
                }
                file.seek(SeekFrom::Start(range.start)).await?;
                ReaderStream::new(file.take(range.len())).boxed()
            }
            None => ReaderStream::new(file).boxed(),
        };

        let (content_type, file_info) = match request.metadata_directive {
            MetadataDirective::Copy => (source.content_type.clone(), source.file_info.clone()),
            MetadataDirective::Replace {
                content_type,
                file_info,
            } => (Some(content_type), file_info),
        };

        let put = PutObjectRequest {
            bucket_id: destination_bucket.id,
            key: request.destination_key,
            content_type,
            file_info,
            legal_hold: request.legal_hold,
            retention: request.retention,
            server_side_encryption: request.destination_server_side_encryption,
        };
        self.upload_version(put, body).await
    }

    /// Delete exactly one version and its payload.
    ///
    /// Refuses versions under legal hold or with an unexpired retention.
    pub async fn delete_version(&self, file_id: &str, key: &str) -> StorageResult<()> {
        let row = self.fetch_version(file_id).await?;
        if row.file_name != key {
            return Err(StorageError::FileVersionNotFound(file_id.to_string()));
        }
        let object: StoredObject = row.try_into()?;
        if is_locked(&object) {
            return Err(StorageError::ObjectLocked(key.to_string()));
        }

        let result = sqlx::query("DELETE FROM file_versions WHERE id = ?")
            .bind(file_id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::FileVersionNotFound(file_id.to_string()));
        }

        if object.action == ActionType::Start {
            self.discard_parts(file_id).await?;
        }

        let file_path = self.object_path(&object.bucket_id, file_id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&object.bucket_id);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    /// Open a version's payload for streaming.
    pub async fn open_version(&self, file_id: &str) -> StorageResult<(StoredObject, File)> {
        let row = self.fetch_version(file_id).await?;
        if row.action != ActionType::Upload {
            return Err(StorageError::FileVersionNotFound(file_id.to_string()));
        }
        let object: StoredObject = row.try_into()?;
        let file_path = self.object_path(&object.bucket_id, file_id);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::FileVersionNotFound(file_id.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok((object, file))
    }

    // --- Downloads ---

    /// Issue a download authorization for names starting with `key_prefix`.
    pub async fn authorize_prefix(
        &self,
        bucket_id: &str,
        key_prefix: &str,
        duration_secs: u64,
    ) -> StorageResult<String> {
        if !(1..=MAX_AUTHORIZATION_SECS).contains(&duration_secs) {
            return Err(StorageError::InvalidRequest(format!(
                "validity must be between 1 and {} seconds",
                MAX_AUTHORIZATION_SECS
            )));
        }
        self.fetch_bucket_by_id(bucket_id).await?;

        let token = new_token();
        let expires_at = Utc::now().timestamp_millis() + (duration_secs as i64) * 1000;
        sqlx::query(
            "INSERT INTO download_authorizations (token, bucket_id, key_prefix, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(bucket_id)
        .bind(key_prefix)
        .bind(expires_at)
        .execute(&*self.db)
        .await?;
        Ok(token)
    }

    /// Check a download credential for `key` in `bucket`.
    ///
    /// Public buckets need none. Private buckets accept the account token or
    /// an unexpired authorization whose prefix covers `key`.
    pub async fn check_download(
        &self,
        bucket: &Bucket,
        key: &str,
        token: Option<&str>,
    ) -> StorageResult<()> {
        if bucket.bucket_type.is_public() {
            return Ok(());
        }
        let token = token.ok_or_else(|| {
            StorageError::Unauthorized("bucket is private and no authorization was given".into())
        })?;
        if token == self.account_token {
            return Ok(());
        }

        let grant: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT bucket_id, key_prefix, expires_at FROM download_authorizations WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;

        match grant {
            Some((bucket_id, key_prefix, expires_at))
                if bucket_id == bucket.id
                    && key.starts_with(&key_prefix)
                    && expires_at > Utc::now().timestamp_millis() =>
            {
                Ok(())
            }
            Some(_) => Err(StorageError::Unauthorized(
                "authorization expired or does not cover this file".into(),
            )),
            None => Err(StorageError::Unauthorized("unknown authorization".into())),
        }
    }

    /// Resolve a download by bucket name and key, enforcing authorization.
    pub async fn open_download(
        &self,
        bucket_name: &str,
        key: &str,
        token: Option<&str>,
    ) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let bucket = self.fetch_bucket(bucket_name).await?;
        self.check_download(&bucket, key, token).await?;
        let current = self.fetch_current(&bucket.id, key).await?;
        self.open_version(&current.id).await
    }

    /// Recursively remove empty directories up to bucket root.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for LocalObjectStore {
    async fn get_object_by_name(&self, bucket_id: &str, key: &str) -> ClientResult<StoredObject> {
        let row = self.fetch_current(bucket_id, key).await?;
        Ok(StoredObject::try_from(row)?)
    }

    fn list_objects(&self, request: ListObjectsRequest) -> BoxStream<'_, ClientResult<StoredObject>> {
        let limit = request.limit.unwrap_or(usize::MAX);
        let state = ListState {
            after: request.start_after.clone(),
            last_folder: None,
            done: false,
        };

        stream::try_unfold((state, request), move |(mut state, request)| async move {
            if state.done {
                return Ok(None);
            }
            let page = self.fetch_page(&request, &mut state).await?;
            Ok::<_, ClientError>(Some((page, (state, request))))
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, ClientError>)))
        .try_flatten()
        .take(limit)
        .boxed()
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        body: ByteStream,
    ) -> ClientResult<StoredObject> {
        Ok(self.upload_version(request, body).await?)
    }

    async fn get_object_content(&self, object_id: &str) -> ClientResult<ByteStream> {
        let (_, file) = self.open_version(object_id).await?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn delete_object_version(&self, object_id: &str, key: &str) -> ClientResult<()> {
        Ok(self.delete_version(object_id, key).await?)
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> ClientResult<StoredObject> {
        Ok(self.copy_version(request).await?)
    }

    async fn get_bucket_by_name(&self, name: &str) -> ClientResult<Bucket> {
        Ok(self.fetch_bucket(name).await?)
    }

    async fn list_buckets(&self) -> ClientResult<Vec<Bucket>> {
        let buckets = sqlx::query_as::<_, Bucket>(
            "SELECT id, name, bucket_type, created_at FROM buckets ORDER BY name ASC",
        )
        .fetch_all(&*self.db)
        .await
        .map_err(StorageError::from)?;
        Ok(buckets)
    }

    fn get_download_url(&self, key: &str, bucket_name: &str, authorized: bool) -> String {
        let url = format!(
            "{}/file/{}/{}",
            self.public_base_url,
            encode_path(bucket_name),
            encode_path(key)
        );
        if authorized {
            format!("{}?Authorization={}", url, self.account_token)
        } else {
            url
        }
    }

    async fn get_download_authorization(
        &self,
        bucket_id: &str,
        key_prefix: &str,
        duration_secs: u64,
    ) -> ClientResult<String> {
        Ok(self
            .authorize_prefix(bucket_id, key_prefix, duration_secs)
            .await?)
    }

    fn key_restriction(&self) -> Option<KeyRestriction> {
        self.restriction.clone()
    }
}

/// Explicit type, else a guess from the name, else binary.
fn resolve_content_type(key: &str, requested: Option<String>) -> String {
    requested
        .filter(|ct| !ct.is_empty() && ct != "b2/x-auto")
        .or_else(|| {
            mime_guess::from_path(key)
                .first()
                .map(|mime| mime.essence_str().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn is_locked(object: &StoredObject) -> bool {
    if object.legal_hold == Some(LegalHold::On) {
        return true;
    }
    object
        .retention
        .as_ref()
        .is_some_and(|retention| retention.retain_until_timestamp > Utc::now().timestamp_millis())
}

fn new_file_id() -> String {
    format!("4_z{}", Uuid::new_v4().simple())
}

/// URL-safe random credential.
fn new_token() -> String {
    let mut raw = Vec::with_capacity(32);
    raw.extend_from_slice(Uuid::new_v4().as_bytes());
    raw.extend_from_slice(Uuid::new_v4().as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(raw)
}

/// Percent-encode everything but unreserved characters and `/`.
fn encode_path(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Compute a synthetic "common prefix" for delimiter listings.
///
/// Returns Some(prefix) if the key continues past the delimiter after the
/// requested prefix, otherwise None.
fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = match requested_prefix {
        Some(prefix) => key.strip_prefix(prefix)?,
        None => key,
    };

    after_prefix.find(delimiter).map(|pos| {
        let mut combined = String::new();
        if let Some(prefix) = requested_prefix {
            combined.push_str(prefix);
        }
        combined.push_str(&after_prefix[..pos + delimiter.len()]);
        combined
    })
}
