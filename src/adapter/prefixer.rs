//! Maps caller paths to store keys under a fixed root prefix, and back.

use super::error::{FilesystemError, FsResult};

const SEPARATOR: char = '/';

/// Joins a configured root prefix with caller paths.
///
/// The stored prefix is either empty or ends with exactly one separator, so
/// `strip_prefix(prefix_path(p)) == normalize(p)` for every valid `p`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathPrefixer {
    prefix: String,
}

impl PathPrefixer {
    pub fn new(prefix: &str) -> FsResult<Self> {
        let normalized = normalize(prefix)?;
        let prefix = if normalized.is_empty() {
            normalized
        } else {
            format!("{}{}", normalized, SEPARATOR)
        };
        Ok(Self { prefix })
    }

    /// Root prefix, empty or ending with `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn prefix_path(&self, path: &str) -> FsResult<String> {
        Ok(format!("{}{}", self.prefix, normalize(path)?))
    }

    /// Like [`prefix_path`](Self::prefix_path) with a single trailing
    /// separator. The bucket root (no prefix, empty path) stays empty.
    pub fn prefix_directory_path(&self, path: &str) -> FsResult<String> {
        let key = self.prefix_path(path)?;
        if key.is_empty() || key.ends_with(SEPARATOR) {
            Ok(key)
        } else {
            Ok(format!("{}{}", key, SEPARATOR))
        }
    }

    /// Inverse of `prefix_path`. Keys outside the prefix fall back to removing
    /// the first occurrence of the prefix.
    pub fn strip_prefix(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            return key.to_string();
        }
        match key.strip_prefix(&self.prefix) {
            Some(rest) => rest.to_string(),
            None => key.replacen(&self.prefix, "", 1),
        }
    }

    /// Stripped path with any trailing separator removed.
    pub fn strip_directory_prefix(&self, key: &str) -> String {
        self.strip_prefix(key)
            .trim_end_matches(SEPARATOR)
            .to_string()
    }
}

/// Canonical form of a caller path: no leading, trailing or doubled
/// separators, `.` segments dropped and `..` resolved.
///
/// Rejects paths that climb above the root and paths containing control
/// characters.
pub fn normalize(path: &str) -> FsResult<String> {
    if path.chars().any(|c| c.is_control()) {
        return Err(FilesystemError::InvalidPath {
            path: path.to_string(),
            reason: "contains control characters",
        });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(FilesystemError::InvalidPath {
                        path: path.to_string(),
                        reason: "traverses above the root",
                    });
                }
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}
