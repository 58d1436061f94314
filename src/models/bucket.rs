//! Represents a bucket — the top-level container for file versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Bucket-wide visibility. The store has no per-object ACL.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub enum BucketType {
    AllPublic,
    AllPrivate,
}

impl BucketType {
    pub fn is_public(&self) -> bool {
        matches!(self, BucketType::AllPublic)
    }
}

impl std::str::FromStr for BucketType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allPublic" | "public" => Ok(BucketType::AllPublic),
            "allPrivate" | "private" => Ok(BucketType::AllPrivate),
            other => Err(format!("unknown bucket type `{}`", other)),
        }
    }
}

/// A storage bucket.
///
/// Buckets act as namespaces for file names. Visibility applies to every
/// object inside the bucket.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Opaque store-assigned identifier.
    pub id: String,

    /// Globally unique bucket name.
    pub name: String,

    /// Whether downloads need an authorization token.
    pub bucket_type: BucketType,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
