//! Projects store entries onto the filesystem attribute model.

use super::error::MetadataError;
use crate::models::{
    attributes::{Attribute, ExtraMetadata, FileAttributes},
    stored_object::StoredObject,
};
use serde_json::{Value, json};

/// File-info entry holding the client-side modification time in epoch ms.
pub const LAST_MODIFIED_INFO_KEY: &str = "src_last_modified_millis";

/// Content type the store reports when it never resolved one.
pub const UNKNOWN_CONTENT_TYPE: &str = "b2/x-auto";

const EXTRA_NAMESPACE: &str = "b2";

/// Attributes needed for one requested field; fails if the store did not
/// report it.
///
/// No fallback is applied: a missing custom modification time is not
/// replaced by the upload time, and an unresolved content type is not
/// replaced by a generic one.
pub fn project(
    object: &StoredObject,
    path: &str,
    requested: Attribute,
) -> Result<FileAttributes, MetadataError> {
    let attributes = project_all(object, path);
    match requested {
        Attribute::FileSize => {
            if attributes.file_size.is_none() {
                return Err(MetadataError::Missing("content length"));
            }
        }
        Attribute::MimeType => {
            if attributes.mime_type.is_none() {
                return Err(MetadataError::Missing("content type"));
            }
        }
        Attribute::LastModified => {
            if attributes.last_modified.is_none() {
                return Err(MetadataError::Missing(LAST_MODIFIED_INFO_KEY));
            }
        }
        Attribute::Visibility => return Err(MetadataError::Missing("visibility")),
        Attribute::Metadata => {}
    }
    Ok(attributes)
}

/// Every field the store reported, absent ones left as `None`.
pub fn project_all(object: &StoredObject, path: &str) -> FileAttributes {
    FileAttributes {
        path: path.to_string(),
        file_size: object.is_upload().then_some(object.size),
        visibility: None,
        last_modified: last_modified_secs(object),
        mime_type: mime_type(object),
        extra_metadata: extra_metadata(object),
    }
}

fn mime_type(object: &StoredObject) -> Option<String> {
    object
        .content_type
        .as_deref()
        .filter(|ct| !ct.is_empty() && *ct != UNKNOWN_CONTENT_TYPE)
        .map(str::to_string)
}

fn last_modified_secs(object: &StoredObject) -> Option<i64> {
    object
        .file_info
        .get(LAST_MODIFIED_INFO_KEY)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .map(|millis| millis.div_euclid(1000))
}

fn extra_key(name: &str) -> String {
    format!("{}.{}", EXTRA_NAMESPACE, name)
}

/// Store-specific values, namespaced under `b2.`.
pub fn extra_metadata(object: &StoredObject) -> ExtraMetadata {
    let mut extra = ExtraMetadata::new();
    if let Some(id) = &object.id {
        extra.insert(extra_key("file_id"), json!(id));
    }
    extra.insert(extra_key("file_info"), json!(object.file_info));
    extra.insert(extra_key("upload_timestamp"), json!(object.upload_timestamp));
    if let Some(md5) = &object.content_md5 {
        extra.insert(extra_key("content_md5"), json!(md5));
    }
    if let Some(sha1) = object.content_sha1.as_deref().filter(|s| *s != "none") {
        extra.insert(extra_key("content_sha1"), json!(sha1));
    }
    if let Some(hold) = object.legal_hold {
        extra.insert(extra_key("legal_hold"), json!(hold.as_str()));
    }
    if let Some(retention) = &object.retention {
        extra.insert(
            extra_key("retention"),
            serde_json::to_value(retention).unwrap_or(Value::Null),
        );
    }
    if let Some(sse) = &object.server_side_encryption {
        extra.insert(
            extra_key("server_side_encryption"),
            serde_json::to_value(sse.redacted()).unwrap_or(Value::Null),
        );
    }
    extra
}
