//! Represents a single file version as reported by the object store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a listed entry stands for.
///
/// The store tags every entry it returns with one of these. Only `Upload`
/// entries are real file content; `Folder` entries are synthesized by
/// delimiter listings, `Hide` entries mask older versions of a name and
/// `Start` entries are large-file uploads that were never finished.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ActionType {
    Upload,
    Folder,
    Hide,
    Start,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Upload => "upload",
            ActionType::Folder => "folder",
            ActionType::Hide => "hide",
            ActionType::Start => "start",
        }
    }
}

/// Legal hold flag attached to a file version.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LegalHold {
    On,
    Off,
}

impl LegalHold {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegalHold::On => "on",
            LegalHold::Off => "off",
        }
    }
}

/// Object lock retention mode.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetentionMode {
    Governance,
    Compliance,
}

/// Object lock retention applied to a file version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Retention {
    pub mode: RetentionMode,

    /// Epoch milliseconds until which the version cannot be deleted.
    pub retain_until_timestamp: i64,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionMode {
    #[serde(rename = "SSE-B2")]
    Managed,
    #[serde(rename = "SSE-C")]
    Customer,
}

/// Server-side encryption descriptor.
///
/// For `SSE-C` the request side carries the customer key; the store never
/// echoes the key back, only its MD5.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerSideEncryption {
    pub mode: EncryptionMode,

    /// Cipher, e.g. "AES256".
    pub algorithm: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_key_md5: Option<String>,
}

impl ServerSideEncryption {
    /// The descriptor as the store reports it back (no key material).
    pub fn redacted(&self) -> Self {
        Self {
            customer_key: None,
            ..self.clone()
        }
    }
}

/// A single entry returned by the object store.
///
/// An entry corresponds either to a concrete file version (upload, hide or
/// start) or to a synthetic folder summary produced by a delimiter listing.
/// Only metadata lives here; content is fetched separately by `id`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    /// File version identifier. Synthetic folder entries have none.
    pub id: Option<String>,

    /// Bucket holding this entry.
    pub bucket_id: String,

    /// Full object key, including any configured root prefix.
    pub key: String,

    /// Content length in bytes.
    pub size: u64,

    /// Epoch milliseconds at which the store accepted the version.
    pub upload_timestamp: i64,

    /// Content type as reported by the store.
    pub content_type: Option<String>,

    pub action: ActionType,

    /// Hex MD5 of the content when the store computed one.
    pub content_md5: Option<String>,

    /// Hex SHA1 of the content when the store computed one.
    pub content_sha1: Option<String>,

    /// Opaque user-defined key/value pairs.
    pub file_info: BTreeMap<String, String>,

    pub legal_hold: Option<LegalHold>,

    pub retention: Option<Retention>,

    pub server_side_encryption: Option<ServerSideEncryption>,
}

impl StoredObject {
    /// Synthetic folder summary for a delimiter listing.
    pub fn folder(bucket_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: None,
            bucket_id: bucket_id.into(),
            key: key.into(),
            size: 0,
            upload_timestamp: 0,
            content_type: None,
            action: ActionType::Folder,
            content_md5: None,
            content_sha1: None,
            file_info: BTreeMap::new(),
            legal_hold: None,
            retention: None,
            server_side_encryption: None,
        }
    }

    pub fn is_upload(&self) -> bool {
        self.action == ActionType::Upload
    }
}
