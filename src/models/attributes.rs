//! Filesystem-facing attribute records projected from store entries.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Store-specific values that have no place in the core attribute model.
///
/// Keys are namespaced under `b2.` so they never collide with filesystem
/// attribute names.
pub type ExtraMetadata = BTreeMap<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// A single attribute a caller may ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    FileSize,
    MimeType,
    LastModified,
    Visibility,
    /// Every reported field at once.
    Metadata,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Attribute::FileSize => "file_size",
            Attribute::MimeType => "mime_type",
            Attribute::LastModified => "last_modified",
            Attribute::Visibility => "visibility",
            Attribute::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// Attributes of a file, as seen through the adapter.
///
/// Fields the store did not report stay `None`; nothing is synthesized.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct FileAttributes {
    /// Caller-visible path (root prefix removed).
    pub path: String,

    pub file_size: Option<u64>,

    /// Always `None`: visibility is a bucket-level concern.
    pub visibility: Option<Visibility>,

    /// Epoch seconds.
    pub last_modified: Option<i64>,

    pub mime_type: Option<String>,

    pub extra_metadata: ExtraMetadata,
}

/// Virtual directories carry nothing but their path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DirectoryAttributes {
    pub path: String,
}

/// One entry of a directory listing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageAttributes {
    File(FileAttributes),
    Dir(DirectoryAttributes),
}

impl StorageAttributes {
    pub fn path(&self) -> &str {
        match self {
            StorageAttributes::File(file) => &file.path,
            StorageAttributes::Dir(dir) => &dir.path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, StorageAttributes::File(_))
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, StorageAttributes::Dir(_))
    }
}
