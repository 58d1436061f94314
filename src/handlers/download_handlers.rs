//! HTTP handler for direct downloads.
//! Streams file bodies to avoid buffering in memory and delegates
//! authorization and lookup to `LocalObjectStore`.

use crate::{
    errors::AppError,
    models::stored_object::StoredObject,
    services::local_store::LocalObjectStore,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Query params accepted by a download.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(rename = "Authorization")]
    pub authorization: Option<String>,
}

/// Download the newest version of `/file/{bucket}/{*key}`.
///
/// Private buckets need a credential, taken from the `Authorization` query
/// parameter or, failing that, the `Authorization` header.
pub async fn download_file(
    State(store): State<LocalObjectStore>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = query.authorization.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    });

    let (object, file) = store.open_download(&bucket, &key, token.as_deref()).await?;
    debug!(bucket = %bucket, key = %key, size = object.size, "serving download");

    let body = Body::from_stream(ReaderStream::new(file));
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &object);
    Ok(response)
}

fn set_file_headers(headers: &mut HeaderMap, object: &StoredObject) {
    let content_type = object
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.size));

    if let Some(id) = object.id.as_deref() {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(HeaderName::from_static("x-bz-file-id"), value);
        }
    }
    if let Some(sha1) = object.content_sha1.as_deref() {
        if let Ok(value) = HeaderValue::from_str(sha1) {
            headers.insert(HeaderName::from_static("x-bz-content-sha1"), value);
        }
    }

    if let Some(uploaded) = Utc.timestamp_millis_opt(object.upload_timestamp).single() {
        if let Ok(value) = HeaderValue::from_str(&uploaded.to_rfc2822()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
