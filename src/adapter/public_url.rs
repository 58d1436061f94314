//! Download URLs for public and private buckets.

use super::{
    B2Adapter,
    error::{FilesystemError, FsResult, UrlError},
};
use crate::models::{bucket::Bucket, options::PublicUrlOptions};
use std::time::Duration;
use tracing::{debug, instrument};

/// Query parameter carrying a download authorization.
pub const AUTHORIZATION_PARAM: &str = "Authorization";

impl B2Adapter {
    /// Direct URL for a public bucket; a time-limited authorized URL for a
    /// private one, which requires `options.valid_for`.
    ///
    /// Expiry is enforced by the store when the URL is fetched.
    #[instrument(skip(self, options))]
    pub async fn public_url(&self, path: &str, options: PublicUrlOptions) -> FsResult<String> {
        let failed = |source: UrlError| FilesystemError::PublicUrlGenerationFailed {
            path: path.to_string(),
            source,
        };
        let key = self.prefixer.prefix_path(path)?;

        // Visibility can change after construction, so ask every time.
        let bucket = self
            .client
            .get_bucket_by_name(&self.bucket.name)
            .await
            .map_err(|err| failed(err.into()))?;

        if bucket.bucket_type.is_public() {
            return Ok(self.client.get_download_url(&key, &bucket.name, false));
        }

        let valid_for = options
            .valid_for
            .filter(|duration| !duration.is_zero())
            .ok_or_else(|| failed(UrlError::ValidityRequired))?;
        self.authorized_url(&bucket, &key, valid_for)
            .await
            .map_err(failed)
    }

    /// Authorized URL regardless of bucket visibility.
    #[instrument(skip(self))]
    pub async fn temporary_url(&self, path: &str, valid_for: Duration) -> FsResult<String> {
        let failed = |source: UrlError| FilesystemError::PublicUrlGenerationFailed {
            path: path.to_string(),
            source,
        };
        if valid_for.is_zero() {
            return Err(failed(UrlError::ValidityRequired));
        }
        let key = self.prefixer.prefix_path(path)?;
        self.authorized_url(&self.bucket, &key, valid_for)
            .await
            .map_err(failed)
    }

    /// The authorization is scoped to exactly `key` as a name prefix.
    async fn authorized_url(
        &self,
        bucket: &Bucket,
        key: &str,
        valid_for: Duration,
    ) -> Result<String, UrlError> {
        // Partial seconds round up.
        let seconds = (valid_for.as_secs() + u64::from(valid_for.subsec_nanos() > 0)).max(1);
        let token = self
            .client
            .get_download_authorization(&bucket.id, key, seconds)
            .await?;
        let url = self.client.get_download_url(key, &bucket.name, false);
        let separator = if url.contains('?') { '&' } else { '?' };
        debug!(%key, seconds, "issued download authorization");
        Ok(format!("{}{}{}={}", url, separator, AUTHORIZATION_PARAM, token))
    }
}
