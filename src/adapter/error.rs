use crate::{client::ClientError, models::attributes::Attribute};
use thiserror::Error;

/// Why a metadata-derived value (attribute or checksum) could not be produced.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("the store does not report `{0}` for this object")]
    Missing(&'static str),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Why a download URL could not be generated.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("a validity duration is required for private buckets")]
    ValidityRequired,
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Failures surfaced to filesystem callers.
///
/// Every variant keeps the caller's path and, where one exists, the
/// underlying cause. Store-internal identifiers never appear here.
#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("unable to check existence of `{path}`")]
    ExistenceCheckFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to write `{path}`")]
    WriteFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to read `{path}`")]
    ReadFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to delete `{path}`")]
    DeleteFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to create directory `{path}`")]
    DirectoryCreateFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    /// Objects deleted before the failure stay deleted.
    #[error("unable to delete directory `{path}`; it may be partially deleted")]
    DirectoryDeleteFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to list contents of `{path}`")]
    ListFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to retrieve {attribute} of `{path}`")]
    MetadataUnavailable {
        path: String,
        attribute: Attribute,
        #[source]
        source: MetadataError,
    },

    #[error("visibility of `{path}` cannot be read or changed: the store has no per-object ACL")]
    VisibilityUnsupported { path: String },

    #[error("checksum algorithm `{algorithm}` is not supported")]
    ChecksumAlgorithmUnsupported { algorithm: String },

    #[error("{algorithm} checksum of `{path}` is unavailable")]
    ChecksumUnavailable {
        path: String,
        algorithm: String,
        #[source]
        source: MetadataError,
    },

    #[error("unable to copy `{from}` to `{to}`")]
    CopyFailed {
        from: String,
        to: String,
        #[source]
        source: ClientError,
    },

    /// The destination may already exist when the delete step failed.
    #[error("unable to move `{from}` to `{to}`; the move may be partially applied")]
    MoveFailed {
        from: String,
        to: String,
        #[source]
        source: Box<FilesystemError>,
    },

    #[error("unable to generate a public URL for `{path}`")]
    PublicUrlGenerationFailed {
        path: String,
        #[source]
        source: UrlError,
    },
}

impl FilesystemError {
    /// Path the failure is about (the source path for copy and move).
    pub fn path(&self) -> Option<&str> {
        match self {
            FilesystemError::InvalidPath { path, .. }
            | FilesystemError::ExistenceCheckFailed { path, .. }
            | FilesystemError::WriteFailed { path, .. }
            | FilesystemError::ReadFailed { path, .. }
            | FilesystemError::DeleteFailed { path, .. }
            | FilesystemError::DirectoryCreateFailed { path, .. }
            | FilesystemError::DirectoryDeleteFailed { path, .. }
            | FilesystemError::ListFailed { path, .. }
            | FilesystemError::MetadataUnavailable { path, .. }
            | FilesystemError::VisibilityUnsupported { path }
            | FilesystemError::ChecksumUnavailable { path, .. }
            | FilesystemError::PublicUrlGenerationFailed { path, .. } => Some(path),
            FilesystemError::CopyFailed { from, .. } | FilesystemError::MoveFailed { from, .. } => {
                Some(from)
            }
            FilesystemError::ChecksumAlgorithmUnsupported { .. } => None,
        }
    }
}

pub type FsResult<T> = Result<T, FilesystemError>;
