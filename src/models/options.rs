//! Per-operation option structures.
//!
//! Every recognized option is a named field. All structures deny unknown
//! fields when deserialized, so a misspelled option fails when the options
//! are built instead of being silently ignored.

use super::stored_object::{LegalHold, Retention, ServerSideEncryption};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

/// Options for `write` and `write_stream`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WriteOptions {
    /// Explicit content type. Detected from path and contents when absent.
    pub content_type: Option<String>,

    /// Extra file info entries stored with the version.
    pub file_info: BTreeMap<String, String>,

    pub legal_hold: Option<LegalHold>,

    pub retention: Option<Retention>,

    pub server_side_encryption: Option<ServerSideEncryption>,
}

/// Whether a copy keeps the source's content type and file info.
///
/// Replacing metadata requires a content type, so the replacement travels
/// inside the variant.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(tag = "directive", rename_all = "UPPERCASE", deny_unknown_fields)]
pub enum MetadataDirective {
    #[default]
    Copy,
    Replace {
        content_type: String,
        #[serde(default)]
        file_info: BTreeMap<String, String>,
    },
}

/// Inclusive byte range of the source to copy.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Options for `copy_file` and `move_file`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CopyOptions {
    /// Destination bucket id. Defaults to the adapter's bucket.
    pub destination_bucket_id: Option<String>,

    pub range: Option<ByteRange>,

    pub metadata_directive: MetadataDirective,

    pub retention: Option<Retention>,

    pub legal_hold: Option<LegalHold>,

    /// Encryption of the source, needed to read SSE-C sources.
    pub source_server_side_encryption: Option<ServerSideEncryption>,

    pub destination_server_side_encryption: Option<ServerSideEncryption>,
}

/// Options for `public_url`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PublicUrlOptions {
    /// How long the generated URL stays valid. Required for private buckets.
    #[serde(with = "duration_secs")]
    pub valid_for: Option<Duration>,
}

impl PublicUrlOptions {
    pub fn valid_for(duration: Duration) -> Self {
        Self {
            valid_for: Some(duration),
        }
    }
}

/// Options for `checksum`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChecksumOptions {
    /// Algorithm name. `sha1` when absent.
    pub algorithm: Option<String>,
}

impl ChecksumOptions {
    pub fn algorithm(name: impl Into<String>) -> Self {
        Self {
            algorithm: Some(name.into()),
        }
    }
}

/// Hash algorithms the store reports per file version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    Md5,
    #[default]
    Sha1,
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            _ => Err(value.to_string()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumAlgorithm::Md5 => f.write_str("md5"),
            ChecksumAlgorithm::Sha1 => f.write_str("sha1"),
        }
    }
}

/// Serializes an optional duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => s.serialize_some(&duration.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
