//! Directory listings.

use super::{
    B2Adapter,
    directory::{self, EntryKind},
    error::{FilesystemError, FsResult},
    projector,
};
use crate::{
    client::ListObjectsRequest,
    models::{
        attributes::{DirectoryAttributes, StorageAttributes},
        stored_object::StoredObject,
    },
};
use futures::{StreamExt, future, stream, stream::BoxStream};

impl B2Adapter {
    /// Lazily lists the entries under `path`.
    ///
    /// A shallow listing passes the delimiter so deeper names collapse into
    /// folder entries; a deep listing receives every descendant. Paging is
    /// handled by the client; calling again restarts from the beginning.
    pub fn list_contents(
        &self,
        path: &str,
        deep: bool,
    ) -> BoxStream<'_, FsResult<StorageAttributes>> {
        let directory_key = match self.prefixer.prefix_directory_path(path) {
            Ok(key) => key,
            Err(err) => return stream::once(future::ready(Err(err))).boxed(),
        };

        let request = ListObjectsRequest {
            bucket_id: self.bucket.id.clone(),
            prefix: directory_key.clone(),
            delimiter: (!deep).then(|| "/".to_string()),
            ..Default::default()
        };
        let path = path.to_string();

        self.client
            .list_objects(request)
            .filter_map(move |entry| {
                let item = match entry {
                    Ok(object) => self.to_storage_attributes(&directory_key, object).map(Ok),
                    Err(source) => Some(Err(FilesystemError::ListFailed {
                        path: path.clone(),
                        source,
                    })),
                };
                future::ready(item)
            })
            .boxed()
    }

    /// `None` for entries that are never surfaced: delete markers, unfinished
    /// uploads and the listed directory's own marker.
    fn to_storage_attributes(
        &self,
        listed_key: &str,
        object: StoredObject,
    ) -> Option<StorageAttributes> {
        match directory::classify(&object)? {
            EntryKind::File => {
                let path = self.prefixer.strip_prefix(&object.key);
                Some(StorageAttributes::File(projector::project_all(&object, &path)))
            }
            EntryKind::Directory(key) if key == listed_key => None,
            EntryKind::Directory(key) => Some(StorageAttributes::Dir(DirectoryAttributes {
                path: self.prefixer.strip_directory_prefix(&key),
            })),
        }
    }
}
