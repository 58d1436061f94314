//! Content-type detection for uploads without an explicit type.

/// Guesses a content type from a path and, when available, the contents.
pub trait MimeTypeDetector: Send + Sync {
    fn detect(&self, path: &str, contents: Option<&[u8]>) -> Option<String>;
}

/// Extension lookup first, then a plain-text sniff of the contents.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultMimeTypeDetector;

impl MimeTypeDetector for DefaultMimeTypeDetector {
    fn detect(&self, path: &str, contents: Option<&[u8]>) -> Option<String> {
        if let Some(guess) = mime_guess::from_path(path).first() {
            return Some(guess.essence_str().to_string());
        }

        let contents = contents?;
        if contents.is_empty() {
            return None;
        }
        let looks_textual = std::str::from_utf8(contents)
            .map(|text| {
                text.chars()
                    .all(|c| !c.is_control() || c.is_ascii_whitespace())
            })
            .unwrap_or(false);
        looks_textual.then(|| "text/plain".to_string())
    }
}
