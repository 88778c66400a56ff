//! S3 object-storage client
//!
//! Provides an [`ObjectClient`] for Amazon S3 and S3-compatible services with:
//! - Multipart uploads for large bodies, with bounded part concurrency
//! - Retry and timeouts configured on the SDK client itself
//! - Custom endpoint support (for MinIO, LocalStack, etc.)

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{retry::RetryConfig, timeout::TimeoutConfig, Builder as S3ConfigBuilder},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::{ByteStream as SdkByteStream, DateTime, DateTimeFormat},
    types::{
        CompletedMultipartUpload, CompletedPart, Delete, ObjectCannedAcl, ObjectIdentifier,
        ServerSideEncryption, StorageClass,
    },
    Client,
};
use bucketfs_core::{config::duration_millis, ClientError};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, trace, warn};

use crate::client::{
    fields, Body, ClientResult, GetObjectOutput, Grant, Grantee, ListPage, ListRequest,
    ObjectClient, Permission, RawEntry,
};
use crate::options::UploadOptions;

/// Smallest part S3 accepts, except for the last one (5 MB)
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Part size used when the upload options carry none
const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Parts in flight when the upload options carry no concurrency
const DEFAULT_CONCURRENCY: usize = 4;

/// Sets every upload option both `PutObject` and `CreateMultipartUpload` accept
///
/// Returns early from the enclosing function on an unparsable `Expires`.
macro_rules! apply_upload_options {
    ($request:expr, $options:expr) => {{
        let options: &UploadOptions = $options;
        let expires = match options.expires() {
            Some(expires) => Some(parse_http_date(expires)?),
            None => None,
        };
        let metadata = options.metadata();
        if options.traffic_limit().is_some() {
            trace!("TrafficLimit is not supported by S3, ignoring");
        }

        $request
            .set_acl(options.acl().map(ObjectCannedAcl::from))
            .set_cache_control(options.cache_control().map(String::from))
            .set_content_disposition(options.content_disposition().map(String::from))
            .set_content_encoding(options.content_encoding().map(String::from))
            .set_content_type(options.content_type().map(String::from))
            .set_expires(expires)
            .set_metadata((!metadata.is_empty()).then_some(metadata))
            .set_server_side_encryption(options.server_side_encryption().map(ServerSideEncryption::from))
            .set_storage_class(options.storage_class().map(StorageClass::from))
            .set_tagging(options.tagging().map(String::from))
    }};
}

/// S3-compatible object-storage client
///
/// Scoped to a single bucket. The SDK client is cheap to clone and shared.
#[derive(Debug, Clone)]
pub struct S3ObjectClient {
    client: Client,
    bucket: String,
}

/// Configuration for [`S3ObjectClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Optional custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: Option<String>,
    /// Force path-style addressing (required for MinIO)
    pub force_path_style: bool,
    /// Attempts per request, including the first, made by the SDK
    pub max_attempts: Option<u32>,
    /// Deadline for a whole operation, retries included
    #[serde(with = "duration_millis")]
    pub operation_timeout: Option<Duration>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint_url: None,
            region: Some("us-east-1".to_string()),
            force_path_style: false,
            max_attempts: None,
            operation_timeout: None,
        }
    }
}

impl S3ObjectClient {
    /// Create a client with default AWS configuration
    ///
    /// Uses environment variables or instance profile for credentials.
    pub async fn new(bucket: impl Into<String>) -> Self {
        Self::with_config(S3Config {
            bucket: bucket.into(),
            ..Default::default()
        })
        .await
    }

    /// Create a client with custom configuration
    pub async fn with_config(config: S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(
                config.region.unwrap_or_else(|| "us-east-1".to_string()),
            ))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(endpoint) = &config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let Some(max_attempts) = config.max_attempts {
            s3_config_builder =
                s3_config_builder.retry_config(RetryConfig::standard().with_max_attempts(max_attempts));
        }

        if let Some(timeout) = config.operation_timeout {
            s3_config_builder = s3_config_builder
                .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }

        Self::from_client(Client::from_conf(s3_config_builder.build()), config.bucket)
    }

    /// Create a client for MinIO (convenience constructor)
    pub async fn minio(endpoint: &str, bucket: &str) -> Self {
        Self::with_config(S3Config {
            bucket: bucket.to_string(),
            endpoint_url: Some(endpoint.to_string()),
            force_path_style: true,
            ..Default::default()
        })
        .await
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The SDK client, for calls this crate does not model
    pub fn sdk_client(&self) -> &Client {
        &self.client
    }

    async fn put_single(&self, key: &str, data: Bytes, options: &UploadOptions) -> ClientResult<()> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(SdkByteStream::from(data));

        apply_upload_options!(request, options)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    async fn start_multipart(&self, key: &str, options: &UploadOptions) -> ClientResult<String> {
        let request = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key);

        let output = apply_upload_options!(request, options)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        let upload_id = output.upload_id().ok_or_else(|| ClientError::Service {
            code: "MissingUploadId".to_string(),
            message: "No upload_id returned".to_string(),
        })?;
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> ClientResult<CompletedPart> {
        let size = data.len();
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        trace!(part_number, size, "Uploaded part");
        Ok(CompletedPart::builder()
            .part_number(part_number)
            .set_e_tag(output.e_tag().map(String::from))
            .build())
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        mut parts: Vec<CompletedPart>,
    ) -> ClientResult<()> {
        parts.sort_by_key(|part| part.part_number());
        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    /// Abort a multipart upload (best effort, for cleanup)
    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let result = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;

        if let Err(e) = result {
            warn!(key, upload_id, error = %DisplayErrorContext(&e), "Failed to abort multipart upload");
        }
    }

    /// Upload an in-memory body in parts, `concurrency` at a time
    async fn multipart_bytes(&self, key: &str, data: Bytes, options: &UploadOptions) -> ClientResult<()> {
        let part_size = part_size(options);
        let concurrency = options.concurrency().unwrap_or(DEFAULT_CONCURRENCY).max(1);
        let upload_id = self.start_multipart(key, options).await?;
        debug!(key, %upload_id, size = data.len(), part_size, concurrency, "Started multipart upload");

        let parts: ClientResult<Vec<CompletedPart>> = stream::iter(part_ranges(data.len() as u64, part_size))
            .map(|(part_number, start, end)| {
                self.upload_part(key, &upload_id, part_number, data.slice(start as usize..end as usize))
            })
            .buffer_unordered(concurrency)
            .try_collect()
            .await;

        self.finish_multipart(key, &upload_id, parts).await
    }

    /// Upload a streamed body, spooling one part at a time
    ///
    /// Bodies that end before filling the first part go up in a single
    /// request.
    async fn multipart_stream(
        &self,
        key: &str,
        mut body: crate::client::ByteStream,
        options: &UploadOptions,
    ) -> ClientResult<()> {
        let part_size = part_size(options) as usize;
        let mut buffer = BytesMut::new();

        while buffer.len() < part_size {
            match body.try_next().await? {
                Some(chunk) => buffer.extend_from_slice(&chunk),
                None => return self.put_single(key, buffer.freeze(), options).await,
            }
        }

        let upload_id = self.start_multipart(key, options).await?;
        debug!(key, %upload_id, part_size, "Started streaming multipart upload");

        let parts = self
            .stream_parts(key, &upload_id, buffer, body, part_size)
            .await;
        self.finish_multipart(key, &upload_id, parts).await
    }

    async fn stream_parts(
        &self,
        key: &str,
        upload_id: &str,
        mut buffer: BytesMut,
        mut body: crate::client::ByteStream,
        part_size: usize,
    ) -> ClientResult<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut part_number = 1;
        let mut ended = false;

        loop {
            while !ended && buffer.len() < part_size {
                match body.try_next().await? {
                    Some(chunk) => buffer.extend_from_slice(&chunk),
                    None => ended = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let part = buffer.split_to(buffer.len().min(part_size)).freeze();
            parts.push(self.upload_part(key, upload_id, part_number, part).await?);
            part_number += 1;
        }

        Ok(parts)
    }

    async fn finish_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: ClientResult<Vec<CompletedPart>>,
    ) -> ClientResult<()> {
        let result = match parts {
            Ok(parts) => {
                let count = parts.len();
                self.complete_multipart(key, upload_id, parts)
                    .await
                    .map(|()| count)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(count) => {
                debug!(key, parts = count, "Completed multipart upload");
                Ok(())
            }
            Err(e) => {
                self.abort_multipart(key, upload_id).await;
                Err(e)
            }
        }
    }
}


fn parse_http_date(value: &str) -> ClientResult<DateTime> {
    DateTime::from_str(value, DateTimeFormat::HttpDate).map_err(|e| ClientError::Request {
        message: format!("invalid Expires value {:?}: {}", value, e),
    })
}

fn format_timestamp(value: &DateTime) -> Option<String> {
    value.fmt(DateTimeFormat::DateTime).ok()
}

fn part_size(options: &UploadOptions) -> u64 {
    options.part_size().unwrap_or(DEFAULT_PART_SIZE).max(MIN_PART_SIZE)
}

/// `(part_number, start, end)` for each part of a `len`-byte body
fn part_ranges(len: u64, part_size: u64) -> Vec<(i32, u64, u64)> {
    (0..len)
        .step_by(part_size as usize)
        .enumerate()
        .map(|(i, start)| (i as i32 + 1, start, (start + part_size).min(len)))
        .collect()
}

/// Percent-encode `bucket/key` for the copy-source header, keeping slashes
fn encode_copy_source(copy_source: &str) -> String {
    copy_source
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a failed call means the key itself is missing
///
/// `NoSuchBucket` is a 404 too, but it is a service failure. HEAD responses
/// carry no error body, so a missing bucket on HEAD is only a bare 404 and
/// still reads as a missing key.
fn is_missing_key(status: Option<u16>, code: Option<&str>) -> bool {
    match code {
        Some("NoSuchKey" | "NotFound") => true,
        Some(_) => false,
        None => status == Some(404),
    }
}

/// Map an SDK failure onto the client error taxonomy
///
/// A missing key (see [`is_missing_key`]) is [`ClientError::NotFound`].
fn map_sdk_error<E>(key: &str, err: SdkError<E>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    if is_missing_key(status, err.code()) {
        return ClientError::NotFound {
            key: key.to_string(),
        };
    }

    match &err {
        SdkError::ServiceError(_) => ClientError::Service {
            code: err.code().unwrap_or("Unknown").to_string(),
            message: err
                .message()
                .map(String::from)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        },
        SdkError::ConstructionFailure(_) => ClientError::Request {
            message: DisplayErrorContext(&err).to_string(),
        },
        _ => ClientError::Transport {
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn head_object(&self, key: &str) -> ClientResult<RawEntry> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        let mut entry = RawEntry::new().with(fields::LOCATION, format!("{}/{}", self.bucket, key));
        entry.insert_opt(fields::CONTENT_LENGTH, output.content_length());
        entry.insert_opt(fields::CONTENT_TYPE, output.content_type());
        entry.insert_opt(fields::LAST_MODIFIED, output.last_modified().and_then(format_timestamp));
        entry.insert_opt(fields::ETAG, output.e_tag());
        entry.insert_opt(fields::VERSION_ID, output.version_id());
        entry.insert_opt(fields::STORAGE_CLASS, output.storage_class().map(|c| c.as_str()));
        entry.insert_opt(fields::RESTORE, output.restore());
        if let Some(metadata) = output.metadata().filter(|m| !m.is_empty()) {
            let metadata: Map<String, Value> = metadata
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect();
            entry.insert(fields::METADATA, metadata);
        }
        Ok(entry)
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn get_object(&self, key: &str) -> ClientResult<GetObjectOutput> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        let mut metadata = RawEntry::new();
        metadata.insert_opt(fields::CONTENT_LENGTH, output.content_length());
        metadata.insert_opt(fields::CONTENT_TYPE, output.content_type());
        metadata.insert_opt(fields::LAST_MODIFIED, output.last_modified().and_then(format_timestamp));
        metadata.insert_opt(fields::ETAG, output.e_tag());

        let body = stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(ClientError::Transport {
                    message: format!("Failed to read S3 response body: {}", e),
                }),
            }
        });

        Ok(GetObjectOutput {
            metadata,
            body: body.boxed(),
        })
    }

    #[instrument(skip(self, body, options), fields(backend = "s3", bucket = %self.bucket))]
    async fn put_object(&self, key: &str, body: Body, options: &UploadOptions) -> ClientResult<()> {
        match body {
            Body::Bytes(data) if data.len() as u64 > part_size(options) => {
                self.multipart_bytes(key, data, options).await
            }
            Body::Bytes(data) => {
                debug!(key, size = data.len(), "Writing to S3");
                self.put_single(key, data, options).await
            }
            Body::Stream(stream) => self.multipart_stream(key, stream, options).await,
        }
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn delete_object(&self, key: &str) -> ClientResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    #[instrument(skip(self, keys), fields(backend = "s3", bucket = %self.bucket, count = keys.len()))]
    async fn delete_objects(&self, keys: &[String]) -> ClientResult<()> {
        let build_error = |e: aws_sdk_s3::error::BuildError| ClientError::Request {
            message: format!("Invalid delete request: {}", e),
        };

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build().map_err(build_error))
            .collect::<ClientResult<Vec<_>>>()?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(build_error)?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error("", e))?;

        // the batch call succeeds even when individual keys fail
        if let Some(failed) = output.errors().first() {
            return Err(ClientError::Service {
                code: failed.code().unwrap_or("Unknown").to_string(),
                message: format!(
                    "{} of {} keys not deleted, first {}: {}",
                    output.errors().len(),
                    keys.len(),
                    failed.key().unwrap_or_default(),
                    failed.message().unwrap_or_default()
                ),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn list_objects(&self, request: &ListRequest) -> ClientResult<ListPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_continuation_token(request.continuation_token.clone())
            .set_max_keys(request.max_keys.map(|max| max as i32))
            .send()
            .await
            .map_err(|e| map_sdk_error(&request.prefix, e))?;

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(String::from))
            .collect();

        let contents = response
            .contents()
            .iter()
            .filter_map(|object| {
                let mut entry = RawEntry::new().with(fields::KEY, object.key()?);
                entry.insert_opt(fields::SIZE, object.size());
                entry.insert_opt(fields::LAST_MODIFIED, object.last_modified().and_then(format_timestamp));
                entry.insert_opt(fields::ETAG, object.e_tag());
                entry.insert_opt(fields::STORAGE_CLASS, object.storage_class().map(|c| c.as_str()));
                Some(entry)
            })
            .collect();

        let next_continuation_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage {
            common_prefixes,
            contents,
            next_continuation_token,
        })
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn get_object_acl(&self, key: &str) -> ClientResult<Vec<Grant>> {
        let output = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        Ok(output
            .grants()
            .iter()
            .filter_map(|grant| {
                let grantee = grant.grantee()?;
                Some(Grant {
                    grantee: Grantee {
                        uri: grantee.uri().map(String::from),
                        id: grantee.id().map(String::from),
                        display_name: grantee.display_name().map(String::from),
                    },
                    permission: Permission::from(grant.permission()?.as_str()),
                })
            })
            .collect())
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn put_object_acl(&self, key: &str, acl: &str) -> ClientResult<()> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3", bucket = %self.bucket))]
    async fn copy_object(&self, copy_source: &str, destination_key: &str) -> ClientResult<()> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(destination_key)
            .copy_source(encode_copy_source(copy_source))
            .send()
            .await
            .map_err(|e| map_sdk_error(copy_source, e))?;
        Ok(())
    }
}
