//! Upload option merging
//!
//! Per-call configuration is filtered through a fixed allow-list, the
//! adapter's default options fill in whatever the call left unset, and a
//! mime type is detected when the caller did not supply one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bucketfs_core::{CallConfig, Visibility};
use serde_json::Value;
use tracing::trace;

use crate::client::Body;
use crate::mime::MimeTypeDetector;
use crate::visibility::VisibilityConverter;

/// Option names passed through to the upload request
pub mod names {
    pub const ACL: &str = "ACL";
    pub const CACHE_CONTROL: &str = "CacheControl";
    pub const CONTENT_DISPOSITION: &str = "ContentDisposition";
    pub const CONTENT_ENCODING: &str = "ContentEncoding";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const EXPIRES: &str = "Expires";
    pub const METADATA: &str = "Metadata";
    pub const SERVER_SIDE_ENCRYPTION: &str = "ServerSideEncryption";
    pub const STORAGE_CLASS: &str = "StorageClass";
    pub const TAGGING: &str = "Tagging";
    pub const TRAFFIC_LIMIT: &str = "TrafficLimit";

    pub const CONCURRENCY: &str = "Concurrency";
    pub const PART_SIZE: &str = "PartSize";
}

/// Request parameters accepted verbatim from per-call config
pub const AVAILABLE_OPTIONS: &[&str] = &[
    names::ACL,
    names::CACHE_CONTROL,
    names::CONTENT_DISPOSITION,
    names::CONTENT_ENCODING,
    names::CONTENT_TYPE,
    names::EXPIRES,
    names::METADATA,
    names::SERVER_SIDE_ENCRYPTION,
    names::STORAGE_CLASS,
    names::TAGGING,
    names::TRAFFIC_LIMIT,
];

/// Multipart tuning knobs
pub const MULTIPART_OPTIONS: &[&str] = &[names::CONCURRENCY, names::PART_SIZE];

/// Merged parameter set consumed by [`ObjectClient::put_object`](crate::ObjectClient::put_object)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    params: BTreeMap<String, Value>,
    multipart: BTreeMap<String, Value>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request parameters, by allow-listed name
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<Value>) {
        self.params.insert(name.to_string(), value.into());
    }

    /// Multipart tuning (`Concurrency`, `PartSize`), kept apart from request parameters
    pub fn set_multipart(&mut self, name: &str, value: impl Into<Value>) {
        self.multipart.insert(name.to_string(), value.into());
    }

    fn str_param(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(Value::as_str)
    }

    pub fn acl(&self) -> Option<&str> {
        self.str_param(names::ACL)
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.str_param(names::CACHE_CONTROL)
    }

    pub fn content_disposition(&self) -> Option<&str> {
        self.str_param(names::CONTENT_DISPOSITION)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.str_param(names::CONTENT_ENCODING)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.str_param(names::CONTENT_TYPE)
    }

    /// HTTP-date after which the object is no longer cacheable
    pub fn expires(&self) -> Option<&str> {
        self.str_param(names::EXPIRES)
    }

    pub fn server_side_encryption(&self) -> Option<&str> {
        self.str_param(names::SERVER_SIDE_ENCRYPTION)
    }

    pub fn storage_class(&self) -> Option<&str> {
        self.str_param(names::STORAGE_CLASS)
    }

    /// URL-encoded tag set (`k1=v1&k2=v2`)
    pub fn tagging(&self) -> Option<&str> {
        self.str_param(names::TAGGING)
    }

    /// Bandwidth cap in bits per second
    pub fn traffic_limit(&self) -> Option<u64> {
        self.param(names::TRAFFIC_LIMIT).and_then(as_u64)
    }

    /// User metadata; non-string values are rendered as JSON text
    pub fn metadata(&self) -> HashMap<String, String> {
        match self.param(names::METADATA) {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// Parts uploaded in parallel by a multipart upload
    pub fn concurrency(&self) -> Option<usize> {
        self.multipart
            .get(names::CONCURRENCY)
            .and_then(as_u64)
            .map(|n| n as usize)
    }

    /// Multipart part size in bytes
    pub fn part_size(&self) -> Option<u64> {
        self.multipart.get(names::PART_SIZE).and_then(as_u64)
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Builds [`UploadOptions`] from per-call config and adapter defaults
#[derive(Debug, Clone)]
pub struct UploadOptionBuilder {
    defaults: BTreeMap<String, Value>,
    visibility: Arc<dyn VisibilityConverter>,
    mime_detector: Arc<dyn MimeTypeDetector>,
}

impl UploadOptionBuilder {
    pub fn new(
        defaults: BTreeMap<String, Value>,
        visibility: Arc<dyn VisibilityConverter>,
        mime_detector: Arc<dyn MimeTypeDetector>,
    ) -> Self {
        Self {
            defaults,
            visibility,
            mime_detector,
        }
    }

    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    pub fn mime_detector(&self) -> Arc<dyn MimeTypeDetector> {
        self.mime_detector.clone()
    }

    /// Merge `config` over the defaults
    ///
    /// Per-call values win. The ACL is resolved separately, first match
    /// wins: per-call `ACL`, per-call `visibility`, default `ACL`, default
    /// `visibility`.
    pub fn build_options(&self, config: &CallConfig) -> UploadOptions {
        let mut options = UploadOptions::new();

        for name in AVAILABLE_OPTIONS.iter().filter(|name| **name != names::ACL) {
            if let Some(value) = config.get(name).or_else(|| self.defaults.get(*name)) {
                options.params.insert(name.to_string(), value.clone());
            }
        }

        for name in MULTIPART_OPTIONS {
            if let Some(value) = config.get(name).or_else(|| self.defaults.get(*name)) {
                options.multipart.insert(name.to_string(), value.clone());
            }
        }

        let acl = config
            .get(names::ACL)
            .cloned()
            .or_else(|| config.get(CallConfig::VISIBILITY).map(|v| self.visibility_acl(v)))
            .or_else(|| self.defaults.get(names::ACL).cloned())
            .or_else(|| self.defaults.get(CallConfig::VISIBILITY).map(|v| self.visibility_acl(v)));
        if let Some(acl) = acl {
            options.params.insert(names::ACL.to_string(), acl);
        }

        for (name, _) in config.iter() {
            if !AVAILABLE_OPTIONS.contains(&name)
                && !MULTIPART_OPTIONS.contains(&name)
                && name != CallConfig::VISIBILITY
            {
                trace!(option = name, "Ignoring unsupported upload option");
            }
        }

        options
    }

    /// Canned ACL for a `visibility` value; anything other than "public" means private
    fn visibility_acl(&self, value: &Value) -> Value {
        let visibility = value
            .as_str()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Visibility::Private);
        Value::from(self.visibility.visibility_to_acl(visibility))
    }

    /// Full option set for uploading `body` to `key`
    ///
    /// Detects the content type for non-empty payloads without one; when
    /// detection has no confident guess the content type stays unset.
    pub fn build(&self, config: &CallConfig, key: &str, body: &Body) -> UploadOptions {
        let mut options = self.build_options(config);

        if !body.is_empty() && !options.params.contains_key(names::CONTENT_TYPE) {
            if let Some(mime_type) = self.mime_detector.detect_mime_type(key, body.as_bytes()) {
                trace!(key, %mime_type, "Detected content type");
                options.set_param(names::CONTENT_TYPE, mime_type);
            }
        }

        options
    }
}
