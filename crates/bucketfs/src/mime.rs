//! Mime type detection for uploads

use std::fmt::Debug;

/// Guesses the content type of an upload
pub trait MimeTypeDetector: Send + Sync + Debug {
    /// Best guess for `key`, optionally looking at the payload
    ///
    /// `None` means no confident guess.
    fn detect_mime_type(&self, key: &str, contents: Option<&[u8]>) -> Option<String>;
}

/// Detects by file extension, then by a few well-known magic numbers
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionMimeTypeDetector;

const MAGIC_NUMBERS: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
];

impl MimeTypeDetector for ExtensionMimeTypeDetector {
    fn detect_mime_type(&self, key: &str, contents: Option<&[u8]>) -> Option<String> {
        if let Some(guess) = mime_guess::from_path(key).first() {
            return Some(guess.essence_str().to_string());
        }

        let contents = contents?;
        MAGIC_NUMBERS
            .iter()
            .find(|(magic, _)| contents.starts_with(magic))
            .map(|(_, mime)| mime.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_extension() {
        let detector = ExtensionMimeTypeDetector;
        assert_eq!(
            detector.detect_mime_type("foo/notes.txt", Some(b"hello")).as_deref(),
            Some("text/plain")
        );
        assert_eq!(
            detector.detect_mime_type("site/index.html", None).as_deref(),
            Some("text/html")
        );
    }

    #[test]
    fn test_detect_by_magic_number() {
        let detector = ExtensionMimeTypeDetector;
        assert_eq!(
            detector
                .detect_mime_type("uploads/blob", Some(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"))
                .as_deref(),
            Some("image/png")
        );
    }

    #[test]
    fn test_no_confident_guess() {
        let detector = ExtensionMimeTypeDetector;
        assert_eq!(detector.detect_mime_type("uploads/blob", Some(b"plain bytes")), None);
        assert_eq!(detector.detect_mime_type("uploads/blob", None), None);
    }
}
