//! Gateway context and operation set
//!
//! [`Gateway`] is the explicitly-owned context threaded through every entry
//! point: it holds the configuration store, the retry policy, and the one
//! cached transport handle. Each operation runs as a single unit of work
//! through the retry executor; failures reach callers already classified.

use crate::client::GatewayClient;
use crate::config::{ConfigStore, DEFAULT_REGION};
use crate::error::{ErrorKind, GatewayError, GatewayResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::transfer::{
    stream_failure, ObjectDownload, PayloadSource, ProgressSink, ProgressTracker,
    MULTIPART_PART_SIZE, MULTIPART_THRESHOLD, TRANSFER_CHUNK_SIZE,
};
use crate::types::{timestamp_from_transport, BucketDescriptor, ObjectDescriptor, PREFIX_DELIMITER};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Cap on fully-materialized listings
///
/// Listing drains the transport stream into memory, which is fine at
/// administration scale but must not grow silently unbounded.
pub const DEFAULT_MAX_LISTING_KEYS: usize = 100_000;

/// Resilient gateway over an S3-compatible object store
pub struct Gateway {
    store: ConfigStore,
    retry: RetryPolicy,
    max_listing_keys: usize,
    cached: Mutex<Option<Arc<GatewayClient>>>,
}

impl Gateway {
    /// Create a gateway over a configuration store
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            max_listing_keys: DEFAULT_MAX_LISTING_KEYS,
            cached: Mutex::new(None),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the listing cap
    pub fn with_max_listing_keys(mut self, cap: usize) -> Self {
        self.max_listing_keys = cap;
        self
    }

    /// The configuration store this gateway reads
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The cached transport handle, rebuilt after any configuration change
    ///
    /// The cache is keyed by the store's version counter, not by config
    /// content: `set`/`clear` invalidate it and the next call constructs a
    /// fresh handle against the new snapshot. An invalidated handle is
    /// dropped, never reused.
    pub async fn client(&self) -> GatewayResult<Arc<GatewayClient>> {
        let version = self.store.version();
        let mut cached = self.cached.lock().await;

        if let Some(client) = cached.as_ref() {
            if client.version() == version {
                return Ok(client.clone());
            }
        }

        let config = self.store.active().ok_or_else(|| {
            GatewayError::configuration_missing(&["endpoint", "access_key", "secret_key"])
        })?;
        let client = Arc::new(GatewayClient::connect(config, version).await?);
        *cached = Some(client.clone());
        Ok(client)
    }

    /// Probe the connection with a lightweight listing call
    ///
    /// Success is `Ok(true)`; any failure surfaces as a classified error
    /// for the caller to map (the health monitor turns it into state).
    pub async fn test_connection(&self) -> GatewayResult<bool> {
        let client = self.client().await?;
        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                client
                    .inner()
                    .list_buckets()
                    .send()
                    .await
                    .map_err(GatewayError::from)?;
                Ok(true)
            }
        })
        .await
    }

    /// List all buckets in transport order; an empty store is not an error
    pub async fn list_buckets(&self) -> GatewayResult<Vec<BucketDescriptor>> {
        let client = self.client().await?;
        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let resp = client
                    .inner()
                    .list_buckets()
                    .send()
                    .await
                    .map_err(GatewayError::from)?;

                let buckets = resp
                    .buckets()
                    .iter()
                    .filter_map(|b| {
                        let name = b.name()?.to_string();
                        Some(BucketDescriptor {
                            name,
                            created_at: b.creation_date().and_then(timestamp_from_transport),
                        })
                    })
                    .collect();
                Ok(buckets)
            }
        })
        .await
    }

    /// List objects under an optional prefix, drained to completion
    ///
    /// The paginated transport listing is materialized fully before
    /// returning, bounded by the configured listing cap; hitting the cap
    /// truncates the result and logs a warning. Keys ending in the path
    /// separator are folder markers and pass through verbatim.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> GatewayResult<Vec<ObjectDescriptor>> {
        require_bucket(bucket)?;
        let client = self.client().await?;
        let cap = self.max_listing_keys;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let mut objects: Vec<ObjectDescriptor> = Vec::new();
                let mut continuation: Option<String> = None;

                loop {
                    let mut request = client.inner().list_objects_v2().bucket(bucket);
                    if let Some(p) = prefix {
                        request = request.prefix(p);
                    }
                    if let Some(token) = &continuation {
                        request = request.continuation_token(token);
                    }

                    let resp = request
                        .send()
                        .await
                        .map_err(|e| GatewayError::from(e).with_resource(bucket))?;

                    for obj in resp.contents() {
                        let Some(key) = obj.key() else { continue };
                        objects.push(ObjectDescriptor {
                            key: key.to_string(),
                            last_modified: obj.last_modified().and_then(timestamp_from_transport),
                            checksum: obj.e_tag().map(|t| t.trim_matches('"').to_string()),
                            size_bytes: obj.size().unwrap_or(0).max(0) as u64,
                            is_prefix_marker: key.ends_with(PREFIX_DELIMITER),
                        });
                        if objects.len() >= cap {
                            warn!(bucket, cap, "listing truncated at configured cap");
                            return Ok(objects);
                        }
                    }

                    if resp.is_truncated().unwrap_or(false) {
                        continuation = resp.next_continuation_token().map(str::to_string);
                        if continuation.is_none() {
                            break;
                        }
                    } else {
                        break;
                    }
                }

                Ok(objects)
            }
        })
        .await
    }

    /// Create a bucket, optionally in an explicit region
    ///
    /// Defaults to the connection's configured region. An existing name
    /// surfaces as `BUCKET_EXISTS` through the classifier.
    pub async fn create_bucket(&self, name: &str, region: Option<&str>) -> GatewayResult<()> {
        require_bucket(name)?;
        let client = self.client().await?;
        let region = region.unwrap_or(&client.config().region).to_string();

        with_retry(&self.retry, || {
            let client = client.clone();
            let region = region.clone();
            async move {
                let mut request = client.inner().create_bucket().bucket(name);
                // us-east-1 is the implicit location; sending it as a
                // constraint is rejected by AWS
                if region != DEFAULT_REGION {
                    request = request.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(region.as_str()))
                            .build(),
                    );
                }
                request
                    .send()
                    .await
                    .map_err(|e| GatewayError::from(e).with_resource(name))?;
                info!(bucket = name, %region, "bucket created");
                Ok(())
            }
        })
        .await
    }

    /// Delete a bucket
    ///
    /// A non-empty bucket is expected to fail with the transport's
    /// not-empty error; the gateway never auto-empties.
    pub async fn delete_bucket(&self, name: &str) -> GatewayResult<()> {
        require_bucket(name)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                client
                    .inner()
                    .delete_bucket()
                    .bucket(name)
                    .send()
                    .await
                    .map_err(|e| GatewayError::from(e).with_resource(name))?;
                info!(bucket = name, "bucket deleted");
                Ok(())
            }
        })
        .await
    }

    /// Whether a bucket exists and is reachable with these credentials
    pub async fn bucket_exists(&self, name: &str) -> GatewayResult<bool> {
        require_bucket(name)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                match client.inner().head_bucket().bucket(name).send().await {
                    Ok(_) => Ok(true),
                    Err(e) if sdk_not_found(&e) => Ok(false),
                    Err(e) => Err(GatewayError::from(e).with_resource(name)),
                }
            }
        })
        .await
    }

    /// The region a bucket lives in
    pub async fn get_bucket_location(&self, name: &str) -> GatewayResult<String> {
        require_bucket(name)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let resp = client
                    .inner()
                    .get_bucket_location()
                    .bucket(name)
                    .send()
                    .await
                    .map_err(|e| GatewayError::from(e).with_resource(name))?;

                // An empty LocationConstraint means us-east-1 on the wire
                let location = resp
                    .location_constraint()
                    .map(|lc| lc.as_str().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_REGION.to_string());
                Ok(location)
            }
        })
        .await
    }

    /// Upload a payload, streaming it to the transport with progress
    ///
    /// Small payloads go up as a single put; payloads at or above the
    /// multipart threshold stream part by part so only one part is ever
    /// buffered. A retried attempt reopens the source and restarts the
    /// transfer from zero — a transient failure after the remote accepted
    /// the write can therefore re-execute it.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &dyn PayloadSource,
        progress: Option<&dyn ProgressSink>,
    ) -> GatewayResult<()> {
        require_bucket(bucket)?;
        require_key(key)?;
        let client = self.client().await?;
        let total = source.len();

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let reader = source.open().await?;
                let mut tracker = ProgressTracker::new(progress, total);

                if total >= MULTIPART_THRESHOLD {
                    upload_multipart(&client, bucket, key, reader, &mut tracker).await?;
                } else {
                    upload_single(&client, bucket, key, total, reader, &mut tracker).await?;
                }

                tracker.finish();
                info!(bucket, key, bytes = total, "object uploaded");
                Ok(())
            }
        })
        .await
    }

    /// Upload an in-memory payload without progress reporting
    pub async fn put_object_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> GatewayResult<()> {
        let payload = crate::transfer::BytesPayload::from(data);
        self.put_object(bucket, key, &payload, None).await
    }

    /// Open an object for streaming download
    ///
    /// Only the request is retried here; the returned handle streams the
    /// body straight through to the caller without re-buffering it.
    pub async fn get_object(&self, bucket: &str, key: &str) -> GatewayResult<ObjectDownload> {
        require_bucket(bucket)?;
        require_key(key)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let resp = client
                    .inner()
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        GatewayError::from(e).with_resource(format!("{bucket}/{key}"))
                    })?;

                let size = resp.content_length().and_then(|l| u64::try_from(l).ok());
                let content_type = resp.content_type().map(str::to_string);
                Ok(ObjectDownload::new(key, size, content_type, resp.body))
            }
        })
        .await
    }

    /// Download an object fully materialized
    ///
    /// The whole fetch-and-drain is one retryable unit: a mid-stream drop
    /// restarts the transfer from zero.
    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> GatewayResult<Bytes> {
        require_bucket(bucket)?;
        require_key(key)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                let resp = client
                    .inner()
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        GatewayError::from(e).with_resource(format!("{bucket}/{key}"))
                    })?;

                let aggregated = resp
                    .body
                    .collect()
                    .await
                    .map_err(|e| stream_failure(&e))?;
                Ok(aggregated.into_bytes())
            }
        })
        .await
    }

    /// Delete an object
    pub async fn delete_object(&self, bucket: &str, key: &str) -> GatewayResult<()> {
        require_bucket(bucket)?;
        require_key(key)?;
        let client = self.client().await?;

        with_retry(&self.retry, || {
            let client = client.clone();
            async move {
                client
                    .inner()
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        GatewayError::from(e).with_resource(format!("{bucket}/{key}"))
                    })?;
                info!(bucket, key, "object deleted");
                Ok(())
            }
        })
        .await
    }

    /// Server-side copy between buckets or keys
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> GatewayResult<()> {
        require_bucket(src_bucket)?;
        require_key(src_key)?;
        require_bucket(dst_bucket)?;
        require_key(dst_key)?;
        let client = self.client().await?;
        let copy_source = format!("{src_bucket}/{src_key}");

        with_retry(&self.retry, || {
            let client = client.clone();
            let copy_source = copy_source.clone();
            async move {
                client
                    .inner()
                    .copy_object()
                    .bucket(dst_bucket)
                    .key(dst_key)
                    .copy_source(&copy_source)
                    .send()
                    .await
                    .map_err(|e| GatewayError::from(e).with_resource(copy_source.clone()))?;
                info!(from = %copy_source, to_bucket = dst_bucket, to_key = dst_key, "object copied");
                Ok(())
            }
        })
        .await
    }

    /// Rename an object via copy-then-delete
    ///
    /// NOT atomic: the two operations are independent, and a delete failure
    /// after a successful copy leaves both keys in place. Callers wanting
    /// the pieces individually should use `copy_object` and
    /// `delete_object` directly.
    pub async fn rename_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> GatewayResult<()> {
        self.copy_object(bucket, src_key, bucket, dst_key).await?;
        self.delete_object(bucket, src_key).await
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("retry", &self.retry)
            .field("max_listing_keys", &self.max_listing_keys)
            .finish_non_exhaustive()
    }
}

/// Upload boundary: bucket name must be present
fn require_bucket(bucket: &str) -> GatewayResult<()> {
    if bucket.trim().is_empty() {
        Err(GatewayError::with_status(
            ErrorKind::InvalidBucketName,
            "bucket name is required",
            400,
        ))
    } else {
        Ok(())
    }
}

/// Upload boundary: object key must be present
fn require_key(key: &str) -> GatewayResult<()> {
    if key.trim().is_empty() {
        Err(GatewayError::validation("object key is required"))
    } else {
        Ok(())
    }
}

/// Whether an SDK failure is a plain not-found
fn sdk_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: fmt::Debug,
    R: fmt::Debug,
{
    let text = format!("{err:?}").to_lowercase();
    text.contains("404") || text.contains("notfound") || text.contains("nosuchbucket")
}

async fn upload_single(
    client: &GatewayClient,
    bucket: &str,
    key: &str,
    total: u64,
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    tracker: &mut ProgressTracker<'_>,
) -> GatewayResult<()> {
    let mut buf = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; TRANSFER_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        tracker.advance(n as u64);
    }

    let content_type = mime_guess::from_path(key).first_or_octet_stream();
    client
        .inner()
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type(content_type.as_ref())
        .body(ByteStream::from(Bytes::from(buf)))
        .send()
        .await
        .map_err(|e| GatewayError::from(e).with_resource(format!("{bucket}/{key}")))?;
    Ok(())
}

async fn upload_multipart(
    client: &GatewayClient,
    bucket: &str,
    key: &str,
    reader: Box<dyn AsyncRead + Send + Unpin>,
    tracker: &mut ProgressTracker<'_>,
) -> GatewayResult<()> {
    let content_type = mime_guess::from_path(key).first_or_octet_stream();
    let created = client
        .inner()
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .content_type(content_type.as_ref())
        .send()
        .await
        .map_err(|e| GatewayError::from(e).with_resource(format!("{bucket}/{key}")))?;

    let upload_id = created
        .upload_id()
        .ok_or_else(|| {
            GatewayError::new(ErrorKind::Unknown, "transport returned no multipart upload id")
        })?
        .to_string();

    match stream_parts(client, bucket, key, &upload_id, reader, tracker).await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Abandoned parts linger server-side until aborted
            if let Err(abort_err) = client
                .inner()
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(bucket, key, "failed to abort multipart upload: {abort_err}");
            }
            Err(err)
        }
    }
}

async fn stream_parts(
    client: &GatewayClient,
    bucket: &str,
    key: &str,
    upload_id: &str,
    mut reader: Box<dyn AsyncRead + Send + Unpin>,
    tracker: &mut ProgressTracker<'_>,
) -> GatewayResult<()> {
    let mut part_number: i32 = 1;
    let mut completed: Vec<CompletedPart> = Vec::new();

    loop {
        let part = read_part(&mut reader, tracker).await?;
        if part.is_empty() {
            break;
        }

        let resp = client
            .inner()
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(part))
            .send()
            .await
            .map_err(GatewayError::from)?;

        completed.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(resp.e_tag().map(str::to_string))
                .build(),
        );
        part_number += 1;
    }

    client
        .inner()
        .complete_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(completed))
                .build(),
        )
        .send()
        .await
        .map_err(GatewayError::from)?;
    Ok(())
}

/// Fill one multipart part from the reader, advancing progress per read
async fn read_part(
    reader: &mut Box<dyn AsyncRead + Send + Unpin>,
    tracker: &mut ProgressTracker<'_>,
) -> GatewayResult<Bytes> {
    let mut part = Vec::with_capacity(MULTIPART_PART_SIZE);
    let mut chunk = vec![0u8; TRANSFER_CHUNK_SIZE];

    while part.len() < MULTIPART_PART_SIZE {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        part.extend_from_slice(&chunk[..n]);
        tracker.advance(n as u64);
    }

    Ok(Bytes::from(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    fn configured_store() -> ConfigStore {
        let store = ConfigStore::new();
        store.set(ConnectionConfig::new("localhost", "minioadmin", "minioadmin"));
        store
    }

    #[tokio::test]
    async fn test_client_is_cached_per_version() {
        let gateway = Gateway::new(configured_store());
        let first = gateway.client().await.unwrap();
        let second = gateway.client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.version(), second.version());
    }

    #[tokio::test]
    async fn test_config_change_invalidates_client() {
        let gateway = Gateway::new(configured_store());
        let first = gateway.client().await.unwrap();

        gateway
            .store()
            .set(ConnectionConfig::new("other-host", "ak2", "sk2"));
        let second = gateway.client().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.version(), second.version());
        assert_eq!(second.config().endpoint, "other-host");

        // The old handle keeps its original snapshot and is never reused
        assert_eq!(first.config().endpoint, "localhost");
        let third = gateway.client().await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn test_unusable_config_fails_with_missing_fields() {
        let store = ConfigStore::new();
        store.set(ConnectionConfig::default());
        let gateway = Gateway::new(store);

        let err = gateway.client().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationMissing);
        assert!(err.message.contains("endpoint"));
        assert!(err.message.contains("access_key"));
        assert!(err.message.contains("secret_key"));
    }

    #[tokio::test]
    async fn test_upload_boundary_validation() {
        let gateway = Gateway::new(ConfigStore::new());

        let err = gateway
            .put_object_bytes("", "key", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidBucketName);
        assert_eq!(err.http_status(), 400);

        let err = gateway
            .put_object_bytes("bucket", "", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_download_boundary_validation() {
        let gateway = Gateway::new(ConfigStore::new());
        assert!(gateway.get_object("", "key").await.is_err());
        assert!(gateway.get_object("bucket", "").await.is_err());
        assert!(gateway.list_objects("", None).await.is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let gateway = Gateway::new(ConfigStore::new())
            .with_retry_policy(RetryPolicy::none())
            .with_max_listing_keys(10);
        assert_eq!(gateway.max_listing_keys, 10);
        assert_eq!(gateway.retry.max_attempts, 1);
    }
}
