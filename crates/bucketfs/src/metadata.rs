//! Raw response fields -> filesystem attributes

use bucketfs_core::{DirectoryAttributes, ExtraMetadata, FileAttributes, StorageAttributes};
use chrono::DateTime;
use serde_json::Value;

use crate::client::{fields, RawEntry};
use crate::prefixer::PathPrefixer;

/// Service fields copied into [`FileAttributes::extra_metadata`] when non-empty
pub const EXTRA_METADATA_FIELDS: &[&str] = &[
    fields::METADATA,
    fields::STORAGE_CLASS,
    fields::ETAG,
    fields::VERSION_ID,
    fields::RESTORE,
];

/// Maps raw entries onto [`StorageAttributes`]
#[derive(Debug, Clone)]
pub struct MetadataMapper {
    prefixer: PathPrefixer,
}

impl MetadataMapper {
    pub fn new(prefixer: PathPrefixer) -> Self {
        Self { prefixer }
    }

    /// Map a head/list entry
    ///
    /// Without `known_path` the logical path comes from the entry's `Key`
    /// (or `Prefix`) field. A path ending in `/` is always a directory.
    pub fn map_object_metadata(&self, raw: &RawEntry, known_path: Option<&str>) -> StorageAttributes {
        let path = match known_path {
            Some(path) => path,
            None => {
                let key = raw
                    .get_str(fields::KEY)
                    .or_else(|| raw.get_str(fields::PREFIX))
                    .unwrap_or_default();
                self.prefixer.strip_prefix(key)
            }
        };

        if path.ends_with('/') {
            return DirectoryAttributes::new(path.trim_end_matches('/')).into();
        }

        FileAttributes {
            path: path.to_string(),
            file_size: raw
                .get(fields::CONTENT_LENGTH)
                .or_else(|| raw.get(fields::SIZE))
                .and_then(parse_size),
            visibility: None,
            last_modified: raw.get_str(fields::LAST_MODIFIED).and_then(parse_timestamp),
            mime_type: raw.get_str(fields::CONTENT_TYPE).map(String::from),
            extra_metadata: extract_extra_metadata(raw),
        }
        .into()
    }
}

fn parse_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Epoch seconds from an RFC 3339 or RFC 2822 / HTTP-date string
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|dt| dt.timestamp())
}

fn extract_extra_metadata(raw: &RawEntry) -> ExtraMetadata {
    EXTRA_METADATA_FIELDS
        .iter()
        .filter_map(|field| {
            let value = raw.get(field)?;
            let empty = match value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            (!empty).then(|| (field.to_string(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper(prefix: &str) -> MetadataMapper {
        MetadataMapper::new(PathPrefixer::new(prefix))
    }

    #[test]
    fn test_head_response_maps_to_file() {
        let raw = RawEntry::new()
            .with(fields::CONTENT_LENGTH, "7")
            .with(fields::CONTENT_TYPE, "text/plain")
            .with(fields::LAST_MODIFIED, "Tue, 29 Apr 2014 18:30:38 GMT")
            .with(fields::ETAG, "\"9a0364b9e99bb480dd25e1f0284c8555\"")
            .with(fields::STORAGE_CLASS, "STANDARD")
            .with(fields::VERSION_ID, "");

        let attrs = mapper("root").map_object_metadata(&raw, Some("foo/bar.md"));
        let file = attrs.into_file().unwrap();

        assert_eq!(file.path, "foo/bar.md");
        assert_eq!(file.file_size, Some(7));
        assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(file.last_modified, Some(1_398_796_238));
        assert_eq!(file.extra_metadata.len(), 2);
        assert_eq!(file.extra_metadata.get("StorageClass"), Some(&json!("STANDARD")));
        assert!(!file.extra_metadata.contains_key("VersionId"));
    }

    #[test]
    fn test_listing_entry_uses_key_and_size() {
        let raw = RawEntry::new()
            .with(fields::KEY, "root/photos/cat.jpg")
            .with(fields::SIZE, 1024)
            .with(fields::LAST_MODIFIED, "2024-01-15T10:30:00.000Z");

        let attrs = mapper("root").map_object_metadata(&raw, None);
        assert_eq!(attrs.path(), "photos/cat.jpg");

        let file = attrs.into_file().unwrap();
        assert_eq!(file.file_size, Some(1024));
        assert_eq!(file.last_modified, Some(1_705_314_600));
        assert_eq!(file.mime_type, None);
    }

    #[test]
    fn test_trailing_slash_is_always_directory() {
        let raw = RawEntry::new()
            .with(fields::KEY, "root/photos/")
            .with(fields::SIZE, 0)
            .with(fields::CONTENT_TYPE, "application/x-directory");
        assert_eq!(
            mapper("root").map_object_metadata(&raw, None),
            StorageAttributes::Directory(DirectoryAttributes::new("photos"))
        );

        let prefix = RawEntry::new().with(fields::PREFIX, "root/photos/2024/");
        assert_eq!(
            mapper("root").map_object_metadata(&prefix, None),
            StorageAttributes::Directory(DirectoryAttributes::new("photos/2024"))
        );
    }

    #[test]
    fn test_unparsable_fields_become_none() {
        let raw = RawEntry::new()
            .with(fields::KEY, "x.bin")
            .with(fields::CONTENT_LENGTH, "lots")
            .with(fields::LAST_MODIFIED, "yesterday-ish");

        let file = mapper("").map_object_metadata(&raw, None).into_file().unwrap();
        assert_eq!(file.file_size, None);
        assert_eq!(file.last_modified, None);
        assert!(file.extra_metadata.is_empty());
    }

    #[test]
    fn test_user_metadata_passthrough() {
        let raw = RawEntry::new()
            .with(fields::KEY, "x.bin")
            .with(fields::METADATA, json!({"owner": "ml"}))
            .with(fields::RESTORE, json!({}));

        let file = mapper("").map_object_metadata(&raw, None).into_file().unwrap();
        assert_eq!(file.extra_metadata.get("Metadata"), Some(&json!({"owner": "ml"})));
        assert!(!file.extra_metadata.contains_key("Restore"));
    }
}
