//! Virtual directories.
//!
//! The store has no directories. A directory exists when some name starts
//! with `dir/`; an otherwise-empty directory is kept alive by a zero-length
//! marker object `dir/.bzEmpty`. Everything that knows about the marker
//! lives in this module.

use super::{
    B2Adapter,
    error::{FilesystemError, FsResult},
};
use crate::{
    client::{ClientError, ListObjectsRequest, PutObjectRequest},
    models::stored_object::{ActionType, StoredObject},
};
use futures::{StreamExt, stream};
use tracing::{debug, instrument};

/// Name of the marker object kept inside otherwise-empty directories.
pub const DIRECTORY_MARKER: &str = ".bzEmpty";

const DELIMITER: &str = "/";

/// How a listed entry is surfaced to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    /// Directory key, ending with the delimiter (empty for the bucket root).
    Directory(String),
}

/// Classifies a store entry. Delete markers and unfinished uploads yield
/// `None` and are never surfaced.
pub fn classify(object: &StoredObject) -> Option<EntryKind> {
    match object.action {
        ActionType::Upload => Some(match marker_directory(&object.key) {
            Some(dir) => EntryKind::Directory(dir.to_string()),
            None => EntryKind::File,
        }),
        ActionType::Folder => Some(EntryKind::Directory(object.key.clone())),
        ActionType::Hide | ActionType::Start => None,
    }
}

pub fn marker_key(directory_key: &str) -> String {
    format!("{}{}", directory_key, DIRECTORY_MARKER)
}

fn marker_directory(key: &str) -> Option<&str> {
    let dir = key.strip_suffix(DIRECTORY_MARKER)?;
    (dir.is_empty() || dir.ends_with(DELIMITER)).then_some(dir)
}

impl B2Adapter {
    /// Writes the marker for `path`. Re-creating a directory only adds a new
    /// marker version.
    #[instrument(skip(self))]
    pub async fn create_directory(&self, path: &str) -> FsResult<()> {
        let directory_key = self.prefixer.prefix_directory_path(path)?;
        let request = PutObjectRequest {
            bucket_id: self.bucket.id.clone(),
            key: marker_key(&directory_key),
            ..Default::default()
        };

        self.client
            .put_object(request, stream::empty().boxed())
            .await
            .map_err(|source| FilesystemError::DirectoryCreateFailed {
                path: path.to_string(),
                source,
            })?;
        debug!(directory = %directory_key, "directory marker written");
        Ok(())
    }

    /// True iff a delimiter listing reports a folder entry for `path`.
    ///
    /// The adapter root always exists.
    #[instrument(skip(self))]
    pub async fn directory_exists(&self, path: &str) -> FsResult<bool> {
        let directory_key = self.prefixer.prefix_directory_path(path)?;
        if directory_key == self.prefixer.prefix() {
            return Ok(true);
        }

        let request = ListObjectsRequest {
            bucket_id: self.bucket.id.clone(),
            prefix: directory_key.trim_end_matches(DELIMITER).to_string(),
            delimiter: Some(DELIMITER.to_string()),
            ..Default::default()
        };
        let mut entries = self.client.list_objects(request);

        // Names sharing the probe prefix sort around the folder entry, so the
        // scan ends as soon as the listing passes it.
        while let Some(entry) = entries.next().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.is_not_found() => return Ok(false),
                Err(source) => {
                    return Err(FilesystemError::ExistenceCheckFailed {
                        path: path.to_string(),
                        source,
                    });
                }
            };
            if entry.key == directory_key {
                return Ok(matches!(classify(&entry), Some(EntryKind::Directory(_))));
            }
            if entry.key.as_str() > directory_key.as_str() {
                break;
            }
        }
        Ok(false)
    }

    /// Deletes every file at or under `path`, all versions of each, then the
    /// directory's own marker.
    ///
    /// Stops at the first failing delete; earlier deletes are not undone. A
    /// missing marker is fine since the directory may only have been implied
    /// by its descendants.
    #[instrument(skip(self))]
    pub async fn delete_directory(&self, path: &str) -> FsResult<()> {
        let directory_key = self.prefixer.prefix_directory_path(path)?;
        let own_marker = marker_key(&directory_key);
        let failed = |source: ClientError| FilesystemError::DirectoryDeleteFailed {
            path: path.to_string(),
            source,
        };

        let request = ListObjectsRequest {
            bucket_id: self.bucket.id.clone(),
            prefix: directory_key.clone(),
            ..Default::default()
        };
        let mut entries = self.client.list_objects(request);
        let mut deleted = 0usize;
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(failed)?;
            if !entry.is_upload() || entry.key == own_marker {
                continue;
            }
            let Some(id) = entry.id.as_deref() else {
                continue;
            };
            self.delete_all_versions(id, &entry.key).await.map_err(failed)?;
            deleted += 1;
        }
        drop(entries);

        match self
            .client
            .get_object_by_name(&self.bucket.id, &own_marker)
            .await
        {
            Ok(marker) => {
                if let (true, Some(id)) = (marker.is_upload(), marker.id.as_deref()) {
                    self.delete_all_versions(id, &marker.key).await.map_err(failed)?;
                }
            }
            Err(err) if err.is_not_found() => {
                debug!(directory = %directory_key, "no marker present, directory was implied");
            }
            Err(err) => return Err(failed(err)),
        }

        debug!(directory = %directory_key, deleted, "directory deleted");
        Ok(())
    }
}
