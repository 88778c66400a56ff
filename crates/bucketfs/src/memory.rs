//! In-memory object-storage client
//!
//! Simulates a single bucket closely enough to exercise the adapter:
//! - Sorted keys with prefix/delimiter listing and continuation tokens
//! - Canned ACLs exposed as grant lists
//! - Server-side copy that does not carry the ACL over
//! - Injectable per-operation failures

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use bucketfs_core::ClientError;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::client::{
    fields, Body, ClientResult, GetObjectOutput, Grant, Grantee, ListPage, ListRequest,
    ObjectClient, Permission, RawEntry,
};
use crate::options::UploadOptions;
use crate::visibility::S3_ALL_USERS_URI;

/// Chunk size used when streaming object bodies back
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Canonical id reported for the bucket owner
const OWNER_ID: &str = "memory-owner";

const CANNED_ACLS: &[&str] = &[
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
    "default",
];

/// Configuration for [`MemoryObjectClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub bucket: String,
    /// Largest page the simulated service returns
    pub page_size: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            bucket: "memory".to_string(),
            page_size: 1000,
        }
    }
}

/// Client operation, for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Head,
    Get,
    Put,
    Delete,
    DeleteMany,
    List,
    GetAcl,
    PutAcl,
    Copy,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
    metadata: HashMap<String, String>,
    storage_class: Option<String>,
    etag: String,
    version_id: String,
    last_modified: DateTime<Utc>,
    acl: String,
}

impl StoredObject {
    fn head(&self, location: String) -> RawEntry {
        let mut entry = RawEntry::new()
            .with(fields::CONTENT_LENGTH, self.data.len() as u64)
            .with(fields::LAST_MODIFIED, self.last_modified.to_rfc2822())
            .with(fields::ETAG, self.etag.clone())
            .with(fields::VERSION_ID, self.version_id.clone())
            .with(fields::LOCATION, location);
        entry.insert_opt(fields::CONTENT_TYPE, self.content_type.clone());
        entry.insert_opt(fields::STORAGE_CLASS, self.storage_class.clone());
        if !self.metadata.is_empty() {
            let metadata: Map<String, Value> = self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect();
            entry.insert(fields::METADATA, metadata);
        }
        entry
    }

    fn summary(&self, key: &str) -> RawEntry {
        let mut entry = RawEntry::new()
            .with(fields::KEY, key)
            .with(fields::SIZE, self.data.len() as u64)
            .with(fields::LAST_MODIFIED, self.last_modified.to_rfc3339())
            .with(fields::ETAG, self.etag.clone());
        entry.insert_opt(fields::STORAGE_CLASS, self.storage_class.clone());
        entry
    }
}

/// In-memory bucket
///
/// Clones share the same bucket contents.
#[derive(Debug, Clone)]
pub struct MemoryObjectClient {
    bucket: String,
    page_size: u32,
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    /// Successful calls left before an operation starts failing
    failures: Arc<Mutex<HashMap<Operation, usize>>>,
}

impl MemoryObjectClient {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_config(MemoryConfig {
            bucket: bucket.into(),
            ..Default::default()
        })
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            bucket: config.bucket,
            page_size: config.page_size.max(1),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Limit every listing page to `page_size` entries
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every call of `operation` fail
    pub fn fail_on(&self, operation: Operation) {
        self.fail_after(operation, 0);
    }

    /// Let `successes` calls of `operation` through, then fail every call
    pub fn fail_after(&self, operation: Operation, successes: usize) {
        self.failures.lock().insert(operation, successes);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Canned ACL currently applied to `key`
    pub fn acl(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).map(|o| o.acl.clone())
    }

    fn check(&self, operation: Operation) -> ClientResult<()> {
        let mut failures = self.failures.lock();
        match failures.get_mut(&operation) {
            Some(0) => Err(ClientError::Service {
                code: "InjectedFailure".to_string(),
                message: format!("{:?} failed", operation),
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn location(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }

    fn not_found(key: &str) -> ClientError {
        ClientError::NotFound {
            key: key.to_string(),
        }
    }

    fn validate_acl(acl: &str) -> ClientResult<()> {
        if CANNED_ACLS.contains(&acl) {
            Ok(())
        } else {
            Err(ClientError::Request {
                message: format!("unsupported canned ACL: {}", acl),
            })
        }
    }
}

fn etag(data: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("\"{:016x}\"", hasher.finish())
}

fn grants_for(acl: &str) -> Vec<Grant> {
    let mut grants = vec![Grant {
        grantee: Grantee {
            id: Some(OWNER_ID.to_string()),
            display_name: Some("owner".to_string()),
            uri: None,
        },
        permission: Permission::FullControl,
    }];

    let everyone = |permission| Grant {
        grantee: Grantee::group(S3_ALL_USERS_URI),
        permission,
    };
    match acl {
        "public-read" => grants.push(everyone(Permission::Read)),
        "public-read-write" => {
            grants.push(everyone(Permission::Read));
            grants.push(everyone(Permission::Write));
        }
        "authenticated-read" => grants.push(Grant {
            grantee: Grantee::group("http://acs.amazonaws.com/groups/global/AuthenticatedUsers"),
            permission: Permission::Read,
        }),
        _ => {}
    }
    grants
}

enum Rolled {
    Object(String),
    Prefix(String),
}

impl Rolled {
    fn name(&self) -> &str {
        match self {
            Rolled::Object(key) | Rolled::Prefix(key) => key,
        }
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn head_object(&self, key: &str) -> ClientResult<RawEntry> {
        self.check(Operation::Head)?;
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| Self::not_found(key))?;
        Ok(object.head(self.location(key)))
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn get_object(&self, key: &str) -> ClientResult<GetObjectOutput> {
        self.check(Operation::Get)?;
        let (metadata, data) = {
            let objects = self.objects.read();
            let object = objects.get(key).ok_or_else(|| Self::not_found(key))?;
            (object.head(self.location(key)), object.data.clone())
        };

        let chunks: Vec<ClientResult<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(GetObjectOutput {
            metadata,
            body: stream::iter(chunks).boxed(),
        })
    }

    #[instrument(skip(self, body, options), fields(backend = "memory", bucket = %self.bucket))]
    async fn put_object(&self, key: &str, body: Body, options: &UploadOptions) -> ClientResult<()> {
        self.check(Operation::Put)?;
        let acl = options.acl().unwrap_or("private").to_string();
        Self::validate_acl(&acl)?;

        let data = match body {
            Body::Bytes(bytes) => bytes,
            Body::Stream(stream) => stream
                .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                    buf.extend_from_slice(&chunk);
                    Ok(buf)
                })
                .await?
                .freeze(),
        };

        debug!(key, size = data.len(), "Storing object");
        let object = StoredObject {
            etag: etag(&data),
            data,
            content_type: options.content_type().map(String::from),
            metadata: options.metadata(),
            storage_class: options.storage_class().map(String::from),
            version_id: Uuid::new_v4().simple().to_string(),
            last_modified: Utc::now(),
            acl,
        };
        self.objects.write().insert(key.to_string(), object);
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn delete_object(&self, key: &str) -> ClientResult<()> {
        self.check(Operation::Delete)?;
        // deleting a missing key succeeds, as on S3
        self.objects.write().remove(key);
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "memory", bucket = %self.bucket, count = keys.len()))]
    async fn delete_objects(&self, keys: &[String]) -> ClientResult<()> {
        self.check(Operation::DeleteMany)?;
        if keys.len() > 1000 {
            return Err(ClientError::Request {
                message: format!("at most 1000 keys per batch, got {}", keys.len()),
            });
        }
        let mut objects = self.objects.write();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn list_objects(&self, request: &ListRequest) -> ClientResult<ListPage> {
        self.check(Operation::List)?;
        let max_keys = request
            .max_keys
            .map_or(self.page_size, |max| max.clamp(1, self.page_size)) as usize;
        let prefix = request.prefix.as_str();
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
        let after = request.continuation_token.as_deref();

        let objects = self.objects.read();
        let mut rolled: Vec<Rolled> = Vec::new();
        for key in objects.range(prefix.to_string()..).map(|(key, _)| key) {
            if !key.starts_with(prefix) {
                break;
            }

            let entry = match delimiter.and_then(|d| key[prefix.len()..].find(d).map(|i| (d, i))) {
                Some((d, i)) => Rolled::Prefix(key[..prefix.len() + i + d.len()].to_string()),
                None => Rolled::Object(key.clone()),
            };

            if after.is_some_and(|after| entry.name() <= after) {
                continue;
            }
            if rolled.last().is_some_and(|last| last.name() == entry.name()) {
                continue;
            }

            rolled.push(entry);
            if rolled.len() > max_keys {
                break;
            }
        }

        let truncated = rolled.len() > max_keys;
        rolled.truncate(max_keys);
        let next_continuation_token = if truncated {
            rolled.last().map(|entry| entry.name().to_string())
        } else {
            None
        };

        let mut page = ListPage {
            next_continuation_token,
            ..Default::default()
        };
        for entry in rolled {
            match entry {
                Rolled::Prefix(prefix) => page.common_prefixes.push(prefix),
                Rolled::Object(key) => {
                    if let Some(object) = objects.get(&key) {
                        page.contents.push(object.summary(&key));
                    }
                }
            }
        }

        debug!(
            prefixes = page.common_prefixes.len(),
            objects = page.contents.len(),
            truncated,
            "Listed objects"
        );
        Ok(page)
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn get_object_acl(&self, key: &str) -> ClientResult<Vec<Grant>> {
        self.check(Operation::GetAcl)?;
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| Self::not_found(key))?;
        Ok(grants_for(&object.acl))
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn put_object_acl(&self, key: &str, acl: &str) -> ClientResult<()> {
        self.check(Operation::PutAcl)?;
        Self::validate_acl(acl)?;
        let mut objects = self.objects.write();
        let object = objects.get_mut(key).ok_or_else(|| Self::not_found(key))?;
        object.acl = acl.to_string();
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory", bucket = %self.bucket))]
    async fn copy_object(&self, copy_source: &str, destination_key: &str) -> ClientResult<()> {
        self.check(Operation::Copy)?;
        let source_key = copy_source
            .strip_prefix(&format!("{}/", self.bucket))
            .ok_or_else(|| ClientError::Request {
                message: format!("copy source outside bucket {}: {}", self.bucket, copy_source),
            })?;

        let mut objects = self.objects.write();
        let source = objects
            .get(source_key)
            .ok_or_else(|| Self::not_found(source_key))?;

        let copy = StoredObject {
            version_id: Uuid::new_v4().simple().to_string(),
            last_modified: Utc::now(),
            // a copy starts out with the default ACL
            acl: "private".to_string(),
            ..source.clone()
        };
        objects.insert(destination_key.to_string(), copy);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ByteStream;

    async fn put(client: &MemoryObjectClient, key: &str, data: &'static [u8]) {
        client
            .put_object(key, Body::Bytes(Bytes::from_static(data)), &UploadOptions::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let client = MemoryObjectClient::new("bucket");
        put(&client, "test.txt", b"hello world").await;

        let output = client.get_object("test.txt").await.unwrap();
        let chunks: Vec<Bytes> = output.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello world");
        assert_eq!(output.metadata.get(fields::CONTENT_LENGTH), Some(&Value::from(11)));
    }

    #[tokio::test]
    async fn test_stream_body_is_collected() {
        let client = MemoryObjectClient::new("bucket");
        let body: ByteStream =
            stream::iter(vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))]).boxed();
        client
            .put_object("s.bin", Body::Stream(body), &UploadOptions::new())
            .await
            .unwrap();

        let head = client.head_object("s.bin").await.unwrap();
        assert_eq!(head.get(fields::CONTENT_LENGTH), Some(&Value::from(4)));
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let client = MemoryObjectClient::new("bucket");
        let result = client.head_object("missing.txt").await;
        assert!(matches!(result, Err(ClientError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delimited_listing() {
        let client = MemoryObjectClient::new("bucket");
        for key in ["a/1", "a/b/2", "a/b/3", "a/c/4", "b"] {
            put(&client, key, b"x").await;
        }

        let request = ListRequest {
            prefix: "a/".to_string(),
            delimiter: Some("/".to_string()),
            ..Default::default()
        };
        let page = client.list_objects(&request).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["a/b/", "a/c/"]);
        assert_eq!(page.contents.len(), 1);
        assert_eq!(page.contents[0].get_str(fields::KEY), Some("a/1"));
        assert!(page.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_common_prefixes_not_repeated_across_pages() {
        let client = MemoryObjectClient::new("bucket").with_page_size(1);
        for key in ["d/x/1", "d/x/2", "d/y/1"] {
            put(&client, key, b"x").await;
        }

        let mut request = ListRequest {
            prefix: "d/".to_string(),
            delimiter: Some("/".to_string()),
            ..Default::default()
        };
        let mut prefixes = Vec::new();
        loop {
            let page = client.list_objects(&request).await.unwrap();
            prefixes.extend(page.common_prefixes);
            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => break,
            }
        }
        assert_eq!(prefixes, vec!["d/x/", "d/y/"]);
    }

    #[tokio::test]
    async fn test_copy_resets_acl() {
        let client = MemoryObjectClient::new("bucket");
        put(&client, "src.txt", b"data").await;
        client.put_object_acl("src.txt", "public-read").await.unwrap();

        client.copy_object("bucket/src.txt", "dst.txt").await.unwrap();
        assert_eq!(client.acl("dst.txt").as_deref(), Some("private"));
        assert_eq!(client.acl("src.txt").as_deref(), Some("public-read"));

        let result = client.copy_object("other/src.txt", "dst.txt").await;
        assert!(matches!(result, Err(ClientError::Request { .. })));
    }

    #[tokio::test]
    async fn test_public_read_grants() {
        let client = MemoryObjectClient::new("bucket");
        put(&client, "p.txt", b"data").await;
        client.put_object_acl("p.txt", "public-read").await.unwrap();

        let grants = client.get_object_acl("p.txt").await.unwrap();
        assert!(grants
            .iter()
            .any(|g| g.grantee.uri.as_deref() == Some(S3_ALL_USERS_URI)
                && g.permission == Permission::Read));

        let result = client.put_object_acl("p.txt", "everyone-please").await;
        assert!(matches!(result, Err(ClientError::Request { .. })));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let client = MemoryObjectClient::new("bucket");
        put(&client, "k", b"x").await;
        client.fail_after(Operation::Head, 1);

        assert!(client.head_object("k").await.is_ok());
        assert!(matches!(
            client.head_object("k").await,
            Err(ClientError::Service { .. })
        ));

        client.clear_failures();
        assert!(client.head_object("k").await.is_ok());
    }
}
