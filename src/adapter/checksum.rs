use super::{
    B2Adapter,
    error::{FilesystemError, FsResult, MetadataError},
};
use crate::models::options::{ChecksumAlgorithm, ChecksumOptions};
use tracing::instrument;

/// Placeholder the store reports instead of a hash it never computed.
const NO_CHECKSUM: &str = "none";

/// Prefix on client-supplied hashes the store did not verify.
const UNVERIFIED_PREFIX: &str = "unverified:";

impl B2Adapter {
    /// Hex digest reported by the store. SHA1 unless `options` says otherwise.
    ///
    /// The algorithm is validated before the object is looked up.
    #[instrument(skip(self))]
    pub async fn checksum(&self, path: &str, options: ChecksumOptions) -> FsResult<String> {
        let algorithm = match options.algorithm.as_deref() {
            None => ChecksumAlgorithm::default(),
            Some(name) => name
                .parse::<ChecksumAlgorithm>()
                .map_err(|algorithm| FilesystemError::ChecksumAlgorithmUnsupported { algorithm })?,
        };
        let unavailable = |source: MetadataError| FilesystemError::ChecksumUnavailable {
            path: path.to_string(),
            algorithm: algorithm.to_string(),
            source,
        };

        let key = self.prefixer.prefix_path(path)?;
        let object = self
            .resolve_file(path, &key)
            .await
            .map_err(|err| unavailable(err.into()))?;

        let (reported, field) = match algorithm {
            ChecksumAlgorithm::Md5 => (object.content_md5, "content MD5"),
            ChecksumAlgorithm::Sha1 => (object.content_sha1, "content SHA1"),
        };
        reported
            .as_deref()
            .map(|value| value.strip_prefix(UNVERIFIED_PREFIX).unwrap_or(value))
            .filter(|value| !value.is_empty() && *value != NO_CHECKSUM)
            .map(str::to_string)
            .ok_or_else(|| unavailable(MetadataError::Missing(field)))
    }
}
