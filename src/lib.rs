/*!
 * Quay - Resilient administration gateway for S3-compatible object stores
 *
 * A server-side facade over MinIO, LocalStack, and AWS S3 that owns the
 * storage-client lifecycle and keeps failure handling out of the callers:
 * - Closed error taxonomy with a single classification point
 * - Bounded retry with linear backoff for transient failures
 * - One cached client handle per configuration, rebuilt on config change
 * - Streaming uploads/downloads with monotonic progress reporting
 * - Periodic connection health monitoring with a cancellable timer
 *
 * The crate is a client layer, not a storage engine: it speaks to any
 * S3-compatible service using path-style addressing and passes credentials
 * through without adding its own authorization.
 *
 * # Example
 *
 * ```no_run
 * use quay::{ConfigStore, ConnectionConfig, Gateway};
 *
 * #[tokio::main]
 * async fn main() -> Result<(), Box<dyn std::error::Error>> {
 *     let store = ConfigStore::new();
 *     store.set(ConnectionConfig::new("localhost", "minioadmin", "minioadmin"));
 *
 *     let gateway = Gateway::new(store);
 *     for bucket in gateway.list_buckets().await? {
 *         println!("{}", bucket.name);
 *     }
 *     Ok(())
 * }
 * ```
 */

pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod retry;
pub mod transfer;
pub mod types;

// Re-export commonly used types
pub use client::GatewayClient;
pub use config::{ConfigStore, ConnectionConfig, DEFAULT_PORT, DEFAULT_REGION};
pub use error::{classify, ErrorKind, GatewayError, GatewayResult};
pub use gateway::{Gateway, DEFAULT_MAX_LISTING_KEYS};
pub use health::{
    ConnectionProbe, HealthMonitor, HealthState, HealthStatus, DEFAULT_CHECK_INTERVAL,
};
pub use retry::{with_retry, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
pub use transfer::{
    BytesPayload, FilePayload, ObjectDownload, PayloadSource, ProgressSink, TransferProgress,
    WatchProgress,
};
pub use types::{BucketDescriptor, ObjectDescriptor, PREFIX_DELIMITER};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
