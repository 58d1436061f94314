//! Represents parts of an unfinished large-file upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single uploaded part of a large file.
///
/// The large file itself is a `start` version in the versions table until it
/// is finished; parts reference it by file id.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct LargeFilePart {
    /// File id of the `start` version this part belongs to.
    pub file_id: String,

    /// Part number (1-based).
    pub part_number: i64,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex SHA1 of this part.
    pub content_sha1: String,

    /// Timestamp when this part was uploaded.
    pub uploaded_at: DateTime<Utc>,
}
