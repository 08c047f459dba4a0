//! Object names and the metadata kept for stored objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

const MAX_OBJECT_NAME_LEN: usize = 1024;

/// Metadata row for an object held by the local backend.
///
/// The payload bytes live on disk; this struct only describes them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Bucket the object belongs to.
    pub bucket: String,

    /// Object name (unique within the bucket).
    pub name: String,

    /// Content type (MIME type) given at upload time.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}

/// Check that a client-supplied name is usable as both a bucket object name
/// and a scratch file suffix.
///
/// Rejects empty names, `.`/`..`, path separators and control characters.
pub fn validate_object_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("object name is empty".into());
    }
    if name.len() > MAX_OBJECT_NAME_LEN {
        return Err(format!(
            "object name is longer than {} bytes",
            MAX_OBJECT_NAME_LEN
        ));
    }
    if name == "." || name == ".." {
        return Err(format!("`{}` is not a valid object name", name));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(format!("object name `{}` contains a path separator", name));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("object name contains control characters".into());
    }
    Ok(())
}

/// Gallery entries are JPEG images only.
pub fn is_jpeg_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Name of the caption record paired with an image: `cat.jpg` -> `cat.json`.
pub fn caption_object_name(image_name: &str) -> String {
    let base = Path::new(image_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(image_name);
    format!("{}.json", base)
}

/// Guess a MIME type from a file extension.
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_file_names() {
        assert!(validate_object_name("cat.jpg").is_ok());
        assert!(validate_object_name("holiday photo (1).JPEG").is_ok());
        assert!(validate_object_name(".hidden.jpg").is_ok());
    }

    #[test]
    fn rejects_traversal_and_separators() {
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("..").is_err());
        assert!(validate_object_name("../etc/passwd").is_err());
        assert!(validate_object_name("dir/cat.jpg").is_err());
        assert!(validate_object_name("dir\\cat.jpg").is_err());
        assert!(validate_object_name("cat\0.jpg").is_err());
        assert!(validate_object_name(&"a".repeat(1025)).is_err());
    }

    #[test]
    fn jpeg_filter_ignores_case() {
        assert!(is_jpeg_name("a.jpg"));
        assert!(is_jpeg_name("B.JPG"));
        assert!(is_jpeg_name("c.JpEg"));
        assert!(!is_jpeg_name("c.json"));
        assert!(!is_jpeg_name("c.png"));
        assert!(!is_jpeg_name("jpg"));
    }

    #[test]
    fn caption_name_replaces_last_extension() {
        assert_eq!(caption_object_name("cat.jpg"), "cat.json");
        assert_eq!(caption_object_name("my.cat.jpeg"), "my.cat.json");
        assert_eq!(caption_object_name("noext"), "noext.json");
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(guess_content_type("x.JPG"), Some("image/jpeg"));
        assert_eq!(guess_content_type("x.jpeg"), Some("image/jpeg"));
        assert_eq!(guess_content_type("x.json"), Some("application/json"));
        assert_eq!(guess_content_type("x.unknown"), None);
        assert_eq!(guess_content_type("noext"), None);
    }
}
