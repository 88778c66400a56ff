//! Filesystem adapter over an object-storage client
//!
//! Directories are emulated: a directory exists when a zero-byte marker
//! object ending in `/` exists, or when any object shares its prefix.

use std::sync::Arc;

use async_trait::async_trait;
use bucketfs_core::{
    AdapterConfig, CallConfig, ClientError, Error, FileAttributes, MetadataAttribute, Result,
    StorageAttributes, Visibility,
};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, instrument, warn};

use crate::client::{fields, Body, ClientResult, ListRequest, ObjectClient};
use crate::filesystem::{ContentStream, FileStream, FilesystemAdapter};
use crate::listing::Listing;
use crate::metadata::MetadataMapper;
use crate::mime::{ExtensionMimeTypeDetector, MimeTypeDetector};
use crate::options::UploadOptionBuilder;
use crate::prefixer::PathPrefixer;
use crate::visibility::{PortableVisibilityConverter, VisibilityConverter};

/// Most keys a single batch delete may carry
const DELETE_BATCH_SIZE: usize = 1000;

/// Filesystem adapter for a bucket
///
/// Holds only immutable configuration, so one instance can be shared
/// between tasks (e.g., behind an `Arc`).
#[derive(Debug)]
pub struct ObjectStorageAdapter<C> {
    client: C,
    bucket: String,
    prefixer: PathPrefixer,
    mapper: MetadataMapper,
    visibility: Arc<dyn VisibilityConverter>,
    uploads: UploadOptionBuilder,
    list_page_size: Option<u32>,
}

impl<C: ObjectClient> ObjectStorageAdapter<C> {
    /// Create an adapter with the portable visibility converter and
    /// extension-based mime detection
    ///
    /// An empty `config.bucket` is taken from the client; a non-empty one
    /// must match it.
    pub fn new(client: C, mut config: AdapterConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            config.bucket = client.bucket().to_string();
        } else if config.bucket != client.bucket() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "adapter bucket {} does not match client bucket {}",
                    config.bucket,
                    client.bucket()
                ),
            });
        }
        config.validate()?;

        let prefixer = PathPrefixer::new(&config.prefix);
        let visibility: Arc<dyn VisibilityConverter> =
            Arc::new(PortableVisibilityConverter::new(config.directory_visibility));
        let mime_detector: Arc<dyn MimeTypeDetector> = Arc::new(ExtensionMimeTypeDetector);

        Ok(Self {
            client,
            bucket: config.bucket,
            mapper: MetadataMapper::new(prefixer.clone()),
            prefixer,
            uploads: UploadOptionBuilder::new(
                config.default_options,
                visibility.clone(),
                mime_detector,
            ),
            visibility,
            list_page_size: config.list_page_size,
        })
    }

    /// Replace the visibility converter
    pub fn with_visibility_converter(mut self, visibility: Arc<dyn VisibilityConverter>) -> Self {
        self.uploads = UploadOptionBuilder::new(
            self.uploads.defaults().clone(),
            visibility.clone(),
            self.uploads.mime_detector(),
        );
        self.visibility = visibility;
        self
    }

    /// Replace the mime type detector
    pub fn with_mime_type_detector(mut self, mime_detector: Arc<dyn MimeTypeDetector>) -> Self {
        self.uploads = UploadOptionBuilder::new(
            self.uploads.defaults().clone(),
            self.visibility.clone(),
            mime_detector,
        );
        self
    }

    /// The underlying client, for operations the adapter does not model
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefixer(&self) -> &PathPrefixer {
        &self.prefixer
    }

    async fn upload(&self, key: &str, body: Body, config: &CallConfig) -> ClientResult<()> {
        let options = self.uploads.build(config, key, &body);
        debug!(%key, ?body, "Uploading object");
        self.client.put_object(key, body, &options).await
    }

    async fn fetch_file_metadata(&self, path: &str, attribute: MetadataAttribute) -> Result<FileAttributes> {
        let key = self.prefixer.prefix_path(path);
        debug!(%key, %attribute, "Fetching object metadata");

        let raw = self
            .client
            .head_object(&key)
            .await
            .map_err(|source| {
                failed(Error::MetadataRetrievalFailed {
                    path: path.to_string(),
                    attribute,
                    reason: String::new(),
                    source: Some(source),
                })
            })?;

        match self.mapper.map_object_metadata(&raw, Some(path)) {
            StorageAttributes::File(file) => Ok(file),
            StorageAttributes::Directory(_) => Err(failed(Error::MetadataRetrievalFailed {
                path: path.to_string(),
                attribute,
                reason: "path refers to a directory".to_string(),
                source: None,
            })),
        }
    }

    /// Fetch `path`'s metadata and require `attribute` to be present
    async fn require_attribute<F>(
        &self,
        path: &str,
        attribute: MetadataAttribute,
        present: F,
    ) -> Result<FileAttributes>
    where
        F: FnOnce(&FileAttributes) -> bool + Send,
    {
        let attributes = self.fetch_file_metadata(path, attribute).await?;
        if present(&attributes) {
            Ok(attributes)
        } else {
            Err(failed(Error::MetadataRetrievalFailed {
                path: path.to_string(),
                attribute,
                reason: format!("{} is not available", attribute),
                source: None,
            }))
        }
    }

    /// Every key under `prefix`, including the prefix's own marker
    async fn collect_keys(&self, prefix: &str) -> ClientResult<Vec<String>> {
        let mut keys = Vec::new();
        if !prefix.is_empty() {
            keys.push(prefix.to_string());
        }

        let listing = Listing::new(&self.client, prefix.to_string(), None, self.list_page_size);
        let mut entries = listing.entries();
        while let Some(entry) = entries.try_next().await? {
            if let Some(key) = entry.get_str(fields::KEY) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> ClientResult<usize> {
        let keys = self.collect_keys(prefix).await?;
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            debug!(%prefix, count = batch.len(), "Deleting batch");
            self.client.delete_objects(batch).await?;
        }
        Ok(keys.len())
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str, config: &CallConfig) -> ClientResult<()> {
        let visibility = match config.visibility() {
            Some(visibility) => visibility,
            None => {
                let grants = self.client.get_object_acl(source_key).await?;
                self.visibility.acl_to_visibility(&grants)
            }
        };

        let head = self.client.head_object(source_key).await?;
        let location = head
            .get_str(fields::LOCATION)
            .map(String::from)
            .unwrap_or_else(|| format!("{}/{}", self.bucket, source_key));

        debug!(%location, %destination_key, %visibility, "Copying object");
        self.client.copy_object(&location, destination_key).await?;
        self.client
            .put_object_acl(destination_key, self.visibility.visibility_to_acl(visibility))
            .await
    }

    // Unlogged halves of delete and copy; move reports their failure once.

    async fn delete_file(&self, path: &str) -> Result<()> {
        let key = self.prefixer.prefix_path(path);
        debug!(%key, "Deleting object");

        self.client
            .delete_object(&key)
            .await
            .map_err(|source| Error::DeleteFailed {
                path: path.to_string(),
                source,
            })
    }

    async fn copy_path(&self, source: &str, destination: &str, config: &CallConfig) -> Result<()> {
        let source_key = self.prefixer.prefix_path(source);
        let destination_key = self.prefixer.prefix_path(destination);

        self.copy_object(&source_key, &destination_key, config)
            .await
            .map_err(|e| Error::CopyFailed {
                from: source.to_string(),
                to: destination.to_string(),
                source: e,
            })
    }
}

fn failed(err: Error) -> Error {
    warn!(error = %err, "Operation failed");
    err
}

async fn collect_body(body: crate::client::ByteStream) -> ClientResult<Bytes> {
    let buf = body
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await?;
    Ok(buf.freeze())
}

#[async_trait]
impl<C: ObjectClient> FilesystemAdapter for ObjectStorageAdapter<C> {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn file_exists(&self, path: &str) -> Result<bool> {
        let key = self.prefixer.prefix_path(path);
        debug!(%key, "Checking file existence");

        match self.client.head_object(&key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(source) => Err(failed(Error::ExistenceCheckFailed {
                path: path.to_string(),
                source,
            })),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn directory_exists(&self, path: &str) -> Result<bool> {
        let prefix = self.prefixer.prefix_directory_path(path);
        debug!(%prefix, "Checking directory existence");

        let request = ListRequest {
            prefix,
            delimiter: Some("/".to_string()),
            continuation_token: None,
            max_keys: Some(1),
        };
        let page = self.client.list_objects(&request).await.map_err(|source| {
            failed(Error::ExistenceCheckFailed {
                path: path.to_string(),
                source,
            })
        })?;

        Ok(!page.contents.is_empty() || !page.common_prefixes.is_empty())
    }

    #[instrument(skip(self, contents, config), fields(bucket = %self.bucket, size = contents.len()))]
    async fn write(&self, path: &str, contents: Bytes, config: &CallConfig) -> Result<()> {
        let key = self.prefixer.prefix_path(path);
        self.upload(&key, Body::Bytes(contents), config)
            .await
            .map_err(|source| {
                failed(Error::WriteFailed {
                    path: path.to_string(),
                    source,
                })
            })
    }

    #[instrument(skip(self, contents, config), fields(bucket = %self.bucket))]
    async fn write_stream(&self, path: &str, contents: ContentStream, config: &CallConfig) -> Result<()> {
        let key = self.prefixer.prefix_path(path);
        let body = contents
            .map_err(|e| ClientError::Transport {
                message: format!("Failed to read upload stream: {}", e),
            })
            .boxed();

        self.upload(&key, Body::Stream(body), config)
            .await
            .map_err(|source| {
                failed(Error::WriteFailed {
                    path: path.to_string(),
                    source,
                })
            })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.prefixer.prefix_path(path);
        debug!(%key, "Reading object");

        let read = async {
            let output = self.client.get_object(&key).await?;
            collect_body(output.body).await
        };

        read.await.map_err(|source| {
            failed(Error::ReadFailed {
                path: path.to_string(),
                source,
            })
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn read_stream(&self, path: &str) -> Result<FileStream> {
        let key = self.prefixer.prefix_path(path);
        debug!(%key, "Opening object stream");

        let output = self.client.get_object(&key).await.map_err(|source| {
            failed(Error::ReadFailed {
                path: path.to_string(),
                source,
            })
        })?;

        let path = path.to_string();
        Ok(output
            .body
            .map_err(move |source| Error::ReadFailed {
                path: path.clone(),
                source,
            })
            .boxed())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, path: &str) -> Result<()> {
        self.delete_file(path).await.map_err(failed)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete_directory(&self, path: &str) -> Result<()> {
        let prefix = self.prefixer.prefix_directory_path(path);
        let deleted = self.delete_prefix(&prefix).await.map_err(|source| {
            failed(Error::DeleteDirectoryFailed {
                path: path.to_string(),
                source,
            })
        })?;

        debug!(%prefix, deleted, "Deleted directory");
        Ok(())
    }

    #[instrument(skip(self, config), fields(bucket = %self.bucket))]
    async fn create_directory(&self, path: &str, config: &CallConfig) -> Result<()> {
        let key = self.prefixer.prefix_directory_path(path);
        let config = config.with_defaults([(
            CallConfig::VISIBILITY,
            self.visibility.default_for_directories().as_str().into(),
        )]);

        self.upload(&key, Body::Bytes(Bytes::new()), &config)
            .await
            .map_err(|source| {
                failed(Error::CreateDirectoryFailed {
                    path: path.to_string(),
                    source,
                })
            })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let key = self.prefixer.prefix_path(path);
        let acl = self.visibility.visibility_to_acl(visibility);
        debug!(%key, acl, "Setting object ACL");

        self.client.put_object_acl(&key, acl).await.map_err(|source| {
            failed(Error::SetVisibilityFailed {
                path: path.to_string(),
                source,
            })
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn visibility(&self, path: &str) -> Result<FileAttributes> {
        let key = self.prefixer.prefix_path(path);
        let grants = self.client.get_object_acl(&key).await.map_err(|source| {
            failed(Error::MetadataRetrievalFailed {
                path: path.to_string(),
                attribute: MetadataAttribute::Visibility,
                reason: String::new(),
                source: Some(source),
            })
        })?;

        let visibility = self.visibility.acl_to_visibility(&grants);
        Ok(FileAttributes::with_visibility(path, visibility))
    }

    async fn mime_type(&self, path: &str) -> Result<FileAttributes> {
        self.require_attribute(path, MetadataAttribute::MimeType, |a| a.mime_type.is_some())
            .await
    }

    async fn last_modified(&self, path: &str) -> Result<FileAttributes> {
        self.require_attribute(path, MetadataAttribute::LastModified, |a| {
            a.last_modified.is_some()
        })
        .await
    }

    async fn file_size(&self, path: &str) -> Result<FileAttributes> {
        self.require_attribute(path, MetadataAttribute::FileSize, |a| a.file_size.is_some())
            .await
    }

    fn list_contents<'a>(&'a self, path: &'a str, deep: bool) -> BoxStream<'a, Result<StorageAttributes>> {
        let prefix = self.prefixer.prefix_directory_path(path);
        let delimiter = if deep { None } else { Some("/") };
        debug!(bucket = %self.bucket, %prefix, deep, "Listing contents");

        let listing = Listing::new(&self.client, prefix, delimiter, self.list_page_size);
        let mapper = &self.mapper;
        listing
            .entries()
            .map(move |entry| match entry {
                Ok(raw) => Ok(mapper.map_object_metadata(&raw, None)),
                Err(source) => Err(failed(Error::ListingFailed {
                    path: path.to_string(),
                    source,
                })),
            })
            .boxed()
    }

    #[instrument(skip(self, config), fields(bucket = %self.bucket))]
    async fn move_file(&self, source: &str, destination: &str, config: &CallConfig) -> Result<()> {
        let moved = async {
            self.copy_path(source, destination, config).await?;
            self.delete_file(source).await
        };

        moved.await.map_err(|e| {
            failed(Error::MoveFailed {
                from: source.to_string(),
                to: destination.to_string(),
                source: Box::new(e),
            })
        })
    }

    #[instrument(skip(self, config), fields(bucket = %self.bucket))]
    async fn copy_file(&self, source: &str, destination: &str, config: &CallConfig) -> Result<()> {
        self.copy_path(source, destination, config).await.map_err(failed)
    }
}
