//! File reads, writes, deletes, copies, moves and attribute lookups.
//!
//! Every operation is a single attempt. Composite operations run their store
//! calls one after another and stop at the first failure.

use super::{
    B2Adapter,
    error::{FilesystemError, FsResult, MetadataError},
    prefixer::normalize,
    projector::{self, LAST_MODIFIED_INFO_KEY},
};
use crate::{
    client::{ByteStream, ClientError, ClientResult, CopyObjectRequest, PutObjectRequest},
    models::{
        attributes::{Attribute, FileAttributes, Visibility},
        options::{CopyOptions, WriteOptions},
        stored_object::StoredObject,
    },
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt, future, stream};
use tracing::{debug, instrument, warn};

impl B2Adapter {
    /// True iff the newest version under `path` is an uploaded file.
    #[instrument(skip(self))]
    pub async fn file_exists(&self, path: &str) -> FsResult<bool> {
        let key = self.prefixer.prefix_path(path)?;
        match self.client.get_object_by_name(&self.bucket.id, &key).await {
            Ok(object) => Ok(object.is_upload()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(source) => Err(FilesystemError::ExistenceCheckFailed {
                path: path.to_string(),
                source,
            }),
        }
    }

    #[instrument(skip(self, contents, options), fields(len = contents.len()))]
    pub async fn write(&self, path: &str, contents: Bytes, options: WriteOptions) -> FsResult<()> {
        let content_type = options
            .content_type
            .clone()
            .or_else(|| self.detector.detect(path, Some(&contents)));
        let body = stream::once(future::ready(Ok(contents))).boxed();
        self.upload(path, body, content_type, options).await
    }

    #[instrument(skip(self, body, options))]
    pub async fn write_stream(
        &self,
        path: &str,
        body: ByteStream,
        options: WriteOptions,
    ) -> FsResult<()> {
        let content_type = options
            .content_type
            .clone()
            .or_else(|| self.detector.detect(path, None));
        self.upload(path, body, content_type, options).await
    }

    /// Always creates a new version; existing versions are left in place.
    async fn upload(
        &self,
        path: &str,
        body: ByteStream,
        content_type: Option<String>,
        options: WriteOptions,
    ) -> FsResult<()> {
        if normalize(path)?.is_empty() {
            return Err(FilesystemError::InvalidPath {
                path: path.to_string(),
                reason: "names the root directory",
            });
        }
        let key = self.prefixer.prefix_path(path)?;

        let mut file_info = options.file_info;
        file_info
            .entry(LAST_MODIFIED_INFO_KEY.to_string())
            .or_insert_with(|| Utc::now().timestamp_millis().to_string());

        let request = PutObjectRequest {
            bucket_id: self.bucket.id.clone(),
            key,
            content_type,
            file_info,
            legal_hold: options.legal_hold,
            retention: options.retention,
            server_side_encryption: options.server_side_encryption,
        };
        let object = self
            .client
            .put_object(request, body)
            .await
            .map_err(|source| FilesystemError::WriteFailed {
                path: path.to_string(),
                source,
            })?;
        debug!(key = %object.key, size = object.size, "uploaded new version");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn read(&self, path: &str) -> FsResult<Bytes> {
        let failed = |source: ClientError| FilesystemError::ReadFailed {
            path: path.to_string(),
            source,
        };
        let key = self.prefixer.prefix_path(path)?;
        let object = self.resolve_file(path, &key).await.map_err(failed)?;
        let mut content = self.open_content(path, &object).await.map_err(failed)?;

        let mut buffer = BytesMut::with_capacity(object.size as usize);
        while let Some(chunk) = content.try_next().await.map_err(|err| failed(err.into()))? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Streams the content. With `stream_reads` off the whole object is
    /// buffered before the stream is returned.
    #[instrument(skip(self))]
    pub async fn read_stream(&self, path: &str) -> FsResult<ByteStream> {
        if !self.stream_reads {
            let contents = self.read(path).await?;
            return Ok(stream::once(future::ready(Ok(contents))).boxed());
        }

        let failed = |source: ClientError| FilesystemError::ReadFailed {
            path: path.to_string(),
            source,
        };
        let key = self.prefixer.prefix_path(path)?;
        let object = self.resolve_file(path, &key).await.map_err(failed)?;
        self.open_content(path, &object).await.map_err(failed)
    }

    async fn open_content(&self, path: &str, object: &StoredObject) -> ClientResult<ByteStream> {
        let id = object
            .id
            .as_deref()
            .ok_or_else(|| ClientError::ObjectNotFound(path.to_string()))?;
        self.client.get_object_content(id).await
    }

    /// Deletes the newest version. A missing file is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> FsResult<()> {
        let failed = |source: ClientError| FilesystemError::DeleteFailed {
            path: path.to_string(),
            source,
        };
        let key = self.prefixer.prefix_path(path)?;
        let object = match self.client.get_object_by_name(&self.bucket.id, &key).await {
            Ok(object) => object,
            Err(err) if err.is_not_found() => {
                debug!(%key, "nothing to delete");
                return Ok(());
            }
            Err(err) => return Err(failed(err)),
        };
        match object.id.as_deref() {
            Some(id) => self.delete_version(id, &object.key).await.map_err(failed),
            None => Ok(()),
        }
    }

    /// Server-side copy of the newest version of `source`.
    #[instrument(skip(self, options))]
    pub async fn copy_file(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> FsResult<()> {
        self.copy_resolved(source, destination, options)
            .await
            .map(|_| ())
    }

    /// Copy then delete the source, older versions included.
    ///
    /// Not atomic: when the delete fails after a successful copy the
    /// destination stays in place and the error says so. Callers should
    /// check both paths after a failed move.
    #[instrument(skip(self, options))]
    pub async fn move_file(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> FsResult<()> {
        let move_failed = |cause: FilesystemError| FilesystemError::MoveFailed {
            from: source.to_string(),
            to: destination.to_string(),
            source: Box::new(cause),
        };

        if normalize(source)? == normalize(destination)? {
            let key = self.prefixer.prefix_path(source)?;
            self.resolve_file(source, &key).await.map_err(|err| {
                move_failed(FilesystemError::CopyFailed {
                    from: source.to_string(),
                    to: destination.to_string(),
                    source: err,
                })
            })?;
            return Ok(());
        }

        let original = self
            .copy_resolved(source, destination, options)
            .await
            .map_err(move_failed)?;

        if let Some(id) = original.id.as_deref() {
            self.delete_all_versions(id, &original.key)
                .await
                .map_err(|err| {
                    warn!(%source, %destination, "copy succeeded but source delete failed");
                    move_failed(FilesystemError::DeleteFailed {
                        path: source.to_string(),
                        source: err,
                    })
                })?;
        }
        Ok(())
    }

    /// Copies and hands back the source version that was copied.
    async fn copy_resolved(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> FsResult<StoredObject> {
        let failed = |err: ClientError| FilesystemError::CopyFailed {
            from: source.to_string(),
            to: destination.to_string(),
            source: err,
        };
        let source_key = self.prefixer.prefix_path(source)?;
        let destination_key = self.prefixer.prefix_path(destination)?;

        let original = self
            .resolve_file(source, &source_key)
            .await
            .map_err(failed)?;
        let source_id = original
            .id
            .clone()
            .ok_or_else(|| failed(ClientError::ObjectNotFound(source.to_string())))?;

        let request = CopyObjectRequest {
            source_id,
            destination_key,
            destination_bucket_id: options.destination_bucket_id,
            range: options.range,
            metadata_directive: options.metadata_directive,
            retention: options.retention,
            legal_hold: options.legal_hold,
            source_server_side_encryption: options.source_server_side_encryption,
            destination_server_side_encryption: options.destination_server_side_encryption,
        };
        let copy = self.client.copy_object(request).await.map_err(failed)?;
        debug!(from = %original.key, to = %copy.key, "server-side copy complete");
        Ok(original)
    }

    #[instrument(skip(self))]
    pub async fn mime_type(&self, path: &str) -> FsResult<FileAttributes> {
        self.fetch_attributes(path, Attribute::MimeType).await
    }

    #[instrument(skip(self))]
    pub async fn last_modified(&self, path: &str) -> FsResult<FileAttributes> {
        self.fetch_attributes(path, Attribute::LastModified).await
    }

    #[instrument(skip(self))]
    pub async fn file_size(&self, path: &str) -> FsResult<FileAttributes> {
        self.fetch_attributes(path, Attribute::FileSize).await
    }

    /// Every reported attribute, missing ones left empty.
    #[instrument(skip(self))]
    pub async fn metadata(&self, path: &str) -> FsResult<FileAttributes> {
        self.fetch_attributes(path, Attribute::Metadata).await
    }

    pub async fn set_visibility(&self, path: &str, _visibility: Visibility) -> FsResult<()> {
        Err(FilesystemError::VisibilityUnsupported {
            path: path.to_string(),
        })
    }

    pub async fn visibility(&self, path: &str) -> FsResult<FileAttributes> {
        Err(FilesystemError::VisibilityUnsupported {
            path: path.to_string(),
        })
    }

    async fn fetch_attributes(&self, path: &str, attribute: Attribute) -> FsResult<FileAttributes> {
        let unavailable = |source: MetadataError| FilesystemError::MetadataUnavailable {
            path: path.to_string(),
            attribute,
            source,
        };
        let normalized = normalize(path)?;
        let key = self.prefixer.prefix_path(path)?;
        let object = self
            .resolve_file(path, &key)
            .await
            .map_err(|err| unavailable(err.into()))?;
        projector::project(&object, &normalized, attribute).map_err(unavailable)
    }

    /// Newest version under `key`, if it is an uploaded file. Not-found
    /// errors name the caller's path rather than the store key.
    pub(crate) async fn resolve_file(&self, path: &str, key: &str) -> ClientResult<StoredObject> {
        match self.client.get_object_by_name(&self.bucket.id, key).await {
            Ok(object) if object.is_upload() => Ok(object),
            Ok(_) => Err(ClientError::ObjectNotFound(path.to_string())),
            Err(err) if err.is_not_found() => Err(ClientError::ObjectNotFound(path.to_string())),
            Err(err) => Err(err),
        }
    }

    /// Deletes version `id` of `key` and every older version that becomes
    /// current after it, until the name no longer resolves.
    pub(crate) async fn delete_all_versions(&self, id: &str, key: &str) -> ClientResult<()> {
        let mut current = id.to_string();
        loop {
            self.delete_version(&current, key).await?;
            match self.client.get_object_by_name(&self.bucket.id, key).await {
                Ok(next) => match next.id {
                    Some(next_id) if next_id != current => {
                        debug!(%key, id = %next_id, "older version surfaced");
                        current = next_id;
                    }
                    _ => return Ok(()),
                },
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    /// Deletes one version, treating an already-missing version as deleted.
    pub(crate) async fn delete_version(&self, id: &str, key: &str) -> ClientResult<()> {
        match self.client.delete_object_version(id, key).await {
            Err(err) if err.is_not_found() => {
                debug!(%key, "version already gone");
                Ok(())
            }
            other => other,
        }
    }
}
