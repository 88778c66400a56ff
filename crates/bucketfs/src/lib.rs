//! bucketfs - Filesystem operations over flat object storage
//!
//! Presents a bucket of keyed objects as a hierarchical filesystem:
//! - Files, directories (marker objects ending in `/`), visibility and metadata
//! - Lazy, restartable listings over paginated bucket listings
//! - In-memory object store (default `memory` feature)
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use bucketfs::{FilesystemAdapter, MemoryObjectClient, ObjectStorageAdapter};
//! use bucketfs_core::{AdapterConfig, CallConfig, Visibility};
//! use bytes::Bytes;
//!
//! # async fn example() -> bucketfs_core::Result<()> {
//! let client = MemoryObjectClient::new("assets");
//! let fs = ObjectStorageAdapter::new(client, AdapterConfig::new("assets").with_prefix("site"))?;
//!
//! let config = CallConfig::new().with_visibility(Visibility::Public);
//! fs.write("css/app.css", Bytes::from("body {}"), &config).await?;
//! let data = fs.read("css/app.css").await?;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod client;
mod filesystem;
mod listing;
mod metadata;
mod mime;
mod options;
mod prefixer;
mod visibility;

#[cfg(any(test, feature = "memory"))]
mod memory;

#[cfg(feature = "s3")]
mod s3;

pub use adapter::ObjectStorageAdapter;
pub use client::{
    fields, Body, ByteStream, ClientResult, GetObjectOutput, Grant, Grantee, ListPage,
    ListRequest, ObjectClient, Permission, RawEntry,
};
pub use filesystem::{ContentStream, FileStream, FilesystemAdapter};
pub use listing::Listing;
pub use metadata::{parse_timestamp, MetadataMapper, EXTRA_METADATA_FIELDS};
pub use mime::{ExtensionMimeTypeDetector, MimeTypeDetector};
pub use options::{names as option_names, UploadOptionBuilder, UploadOptions, AVAILABLE_OPTIONS, MULTIPART_OPTIONS};
pub use prefixer::{normalize, PathPrefixer};
pub use visibility::{
    PortableVisibilityConverter, VisibilityConverter, COS_ALL_USERS_URI, PRIVATE_ACL,
    PUBLIC_READ_ACL, S3_ALL_USERS_URI,
};

#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryConfig, MemoryObjectClient, Operation};

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3ObjectClient};
