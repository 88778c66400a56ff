//! Object-storage client trait definition
//!
//! Defines the bucket-scoped interface the adapter consumes. Implementations
//! talk to a real service (S3, with the `s3` feature) or simulate one in
//! memory.

use std::fmt;

use async_trait::async_trait;
use bucketfs_core::ClientError;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::options::UploadOptions;

/// Result type for client calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Streaming object body
pub type ByteStream = BoxStream<'static, ClientResult<Bytes>>;

/// Service field names used in [`RawEntry`]
pub mod fields {
    pub const KEY: &str = "Key";
    pub const PREFIX: &str = "Prefix";
    pub const CONTENT_LENGTH: &str = "ContentLength";
    pub const SIZE: &str = "Size";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const LAST_MODIFIED: &str = "LastModified";
    pub const ETAG: &str = "ETag";
    pub const STORAGE_CLASS: &str = "StorageClass";
    pub const VERSION_ID: &str = "VersionId";
    pub const RESTORE: &str = "Restore";
    pub const METADATA: &str = "Metadata";
    pub const LOCATION: &str = "Location";
}

/// Structured response fields of a head, get or list call
///
/// Field names follow the service's own naming (see [`fields`]); values
/// are kept as returned so the metadata mapper decides how to interpret
/// them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEntry(Map<String, Value>);

impl RawEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    /// Insert `value` only when it is present
    pub fn insert_opt<V: Into<Value>>(&mut self, field: &str, value: Option<V>) {
        if let Some(value) = value {
            self.insert(field, value);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }
}

/// Request body handed to [`ObjectClient::put_object`]
pub enum Body {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl Body {
    /// True only for an in-memory body of zero length
    ///
    /// A stream's length is unknown up front, so it is never empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Body::Bytes(bytes) => Some(bytes),
            Body::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

/// Response of [`ObjectClient::get_object`]
pub struct GetObjectOutput {
    pub metadata: RawEntry,
    pub body: ByteStream,
}

/// One listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
    pub max_keys: Option<u32>,
}

/// One page of listing results
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Directory boundaries under a delimited listing
    pub common_prefixes: Vec<String>,

    /// Objects, each carrying at least a `Key` field
    pub contents: Vec<RawEntry>,

    /// Present while the service has more results
    pub next_continuation_token: Option<String>,
}

/// Permission carried by an ACL grant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
    Other(String),
}

impl Permission {
    pub fn as_str(&self) -> &str {
        match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::ReadAcp => "READ_ACP",
            Permission::WriteAcp => "WRITE_ACP",
            Permission::FullControl => "FULL_CONTROL",
            Permission::Other(other) => other,
        }
    }

    /// Whether the grantee may read the object's data
    pub fn allows_read(&self) -> bool {
        matches!(self, Permission::Read | Permission::FullControl)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        match value {
            "READ" => Permission::Read,
            "WRITE" => Permission::Write,
            "READ_ACP" => Permission::ReadAcp,
            "WRITE_ACP" => Permission::WriteAcp,
            "FULL_CONTROL" => Permission::FullControl,
            other => Permission::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grantee {
    /// Group URI, for group grantees
    pub uri: Option<String>,
    /// Canonical user id, for user grantees
    pub id: Option<String>,
    pub display_name: Option<String>,
}

impl Grantee {
    pub fn group(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

/// Async trait for bucket-scoped object-storage clients
///
/// Every method is a single round trip. Implementations report a missing
/// key as [`ClientError::NotFound`] and must not be relied upon for
/// anything beyond the one call; the adapter never retries.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Bucket this client is scoped to
    fn bucket(&self) -> &str;

    /// Fetch an object's metadata without transferring its body
    async fn head_object(&self, key: &str) -> ClientResult<RawEntry>;

    /// Fetch an object, exposing its body as a stream
    async fn get_object(&self, key: &str) -> ClientResult<GetObjectOutput>;

    /// Store an object
    ///
    /// # Arguments
    /// * `key` - Storage key
    /// * `body` - Payload, either in memory or streamed
    /// * `options` - Merged upload options (headers, ACL, multipart knobs)
    async fn put_object(&self, key: &str, body: Body, options: &UploadOptions) -> ClientResult<()>;

    /// Delete a single object
    async fn delete_object(&self, key: &str) -> ClientResult<()>;

    /// Delete a batch of objects in one request
    ///
    /// Callers keep batches at or below 1000 keys.
    async fn delete_objects(&self, keys: &[String]) -> ClientResult<()>;

    /// Fetch one page of a listing
    async fn list_objects(&self, request: &ListRequest) -> ClientResult<ListPage>;

    async fn get_object_acl(&self, key: &str) -> ClientResult<Vec<Grant>>;

    /// Replace an object's ACL with a canned ACL (e.g., "public-read")
    async fn put_object_acl(&self, key: &str, acl: &str) -> ClientResult<()>;

    /// Server-side copy
    ///
    /// # Arguments
    /// * `copy_source` - Source location as `bucket/key`
    /// * `destination_key` - Storage key to copy to
    async fn copy_object(&self, copy_source: &str, destination_key: &str) -> ClientResult<()>;
}
