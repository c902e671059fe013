//! Live integration tests against a running S3-compatible service
//!
//! These tests require a reachable MinIO/LocalStack/S3 endpoint. Configure
//! it through the gateway's environment variables and enable the tests
//! explicitly:
//!
//! - `QUAY_TESTS_ENABLED`: set to "1" to enable
//! - `ENDPOINT`: service host (e.g. `localhost`)
//! - `PORT`: service port (default 9000)
//! - `USE_TLS`: "true" to use HTTPS (default false)
//! - `ACCESS_KEY` / `SECRET_KEY`: credentials
//! - `REGION`: region (default us-east-1)
//!
//! Run with: `QUAY_TESTS_ENABLED=1 cargo test --test live_gateway -- --ignored`

use bytes::Bytes;
use quay::{
    BytesPayload, ConfigStore, ConnectionConfig, ErrorKind, Gateway, HealthMonitor, HealthStatus,
    ProgressSink, TransferProgress,
};
use std::env;
use std::sync::{Arc, Mutex};

fn live_tests_enabled() -> bool {
    env::var("QUAY_TESTS_ENABLED").unwrap_or_default() == "1"
}

fn live_gateway() -> Option<Gateway> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let config = ConnectionConfig::from_env()?;
    let store = ConfigStore::new();
    store.set(config);
    Some(Gateway::new(store))
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TransferProgress>>,
}

impl ProgressSink for RecordingSink {
    fn report(&self, progress: TransferProgress) {
        self.events.lock().unwrap().push(progress);
    }
}

#[tokio::test]
#[ignore]
async fn test_connection() {
    if !live_tests_enabled() {
        println!("Skipping live gateway test - set QUAY_TESTS_ENABLED=1 to run");
        return;
    }

    let gateway = live_gateway().expect("live tests need ENDPOINT/ACCESS_KEY/SECRET_KEY");
    assert!(gateway.test_connection().await.expect("connection test failed"));
}

#[tokio::test]
#[ignore]
async fn test_bucket_and_object_lifecycle() {
    if !live_tests_enabled() {
        return;
    }

    let gateway = live_gateway().expect("live tests need ENDPOINT/ACCESS_KEY/SECRET_KEY");
    let bucket = "quay-e2e-demo";

    // Start from a clean slate
    if gateway.bucket_exists(bucket).await.unwrap() {
        for obj in gateway.list_objects(bucket, None).await.unwrap() {
            gateway.delete_object(bucket, &obj.key).await.unwrap();
        }
        gateway.delete_bucket(bucket).await.unwrap();
    }

    gateway.create_bucket(bucket, Some("us-east-1")).await.unwrap();
    assert!(gateway.bucket_exists(bucket).await.unwrap());

    let buckets = gateway.list_buckets().await.unwrap();
    assert!(buckets.iter().any(|b| b.name == bucket));

    // Creating the same bucket again is definitive, not retried into success
    let err = gateway.create_bucket(bucket, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BucketExists);

    // 12-byte payload under a folder-style key
    let payload = Bytes::from_static(b"hello quay!!");
    gateway
        .put_object_bytes(bucket, "a/b.txt", payload.clone())
        .await
        .unwrap();

    let objects = gateway.list_objects(bucket, None).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, "a/b.txt");
    assert_eq!(objects[0].size_bytes, 12);
    assert!(!objects[0].is_prefix_marker);

    // Prefix filtering
    let objects = gateway.list_objects(bucket, Some("a/")).await.unwrap();
    assert_eq!(objects.len(), 1);
    assert!(gateway.list_objects(bucket, Some("z/")).await.unwrap().is_empty());

    // Round-trip the payload
    let data = gateway.get_object_bytes(bucket, "a/b.txt").await.unwrap();
    assert_eq!(data, payload);

    let download = gateway.get_object(bucket, "a/b.txt").await.unwrap();
    assert_eq!(download.suggested_filename(), "b.txt");
    assert_eq!(download.size_bytes(), Some(12));

    // Copy and rename are independent, non-transactional operations
    gateway
        .copy_object(bucket, "a/b.txt", bucket, "a/copy.txt")
        .await
        .unwrap();
    gateway
        .rename_object(bucket, "a/copy.txt", "a/renamed.txt")
        .await
        .unwrap();
    let err = gateway.get_object_bytes(bucket, "a/copy.txt").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ObjectNotFound);

    // Deleting a non-empty bucket must fail; the gateway never auto-empties
    assert!(gateway.delete_bucket(bucket).await.is_err());

    gateway.delete_object(bucket, "a/b.txt").await.unwrap();
    gateway.delete_object(bucket, "a/renamed.txt").await.unwrap();
    gateway.delete_bucket(bucket).await.unwrap();
    assert!(!gateway.bucket_exists(bucket).await.unwrap());

    // Missing object surfaces as OBJECT_NOT_FOUND after recreation checks
    let err = gateway.get_object_bytes("quay-e2e-demo-missing", "x").await.unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::BucketNotFound | ErrorKind::ObjectNotFound
    ));
}

#[tokio::test]
#[ignore]
async fn test_upload_progress_is_monotonic() {
    if !live_tests_enabled() {
        return;
    }

    let gateway = live_gateway().expect("live tests need ENDPOINT/ACCESS_KEY/SECRET_KEY");
    let bucket = "quay-e2e-progress";

    if !gateway.bucket_exists(bucket).await.unwrap() {
        gateway.create_bucket(bucket, None).await.unwrap();
    }

    let payload = BytesPayload::from(vec![0xA5u8; 1024 * 1024]);
    let sink = RecordingSink::default();
    gateway
        .put_object(bucket, "progress.bin", &payload, Some(&sink))
        .await
        .unwrap();

    let events = sink.events.lock().unwrap().clone();
    assert!(!events.is_empty());
    let mut last = 0u8;
    for event in &events {
        assert!(event.percentage >= last, "progress went backwards");
        last = event.percentage;
    }
    assert_eq!(events.last().unwrap().percentage, 100);

    gateway.delete_object(bucket, "progress.bin").await.unwrap();
    gateway.delete_bucket(bucket).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_bucket_location() {
    if !live_tests_enabled() {
        return;
    }

    let gateway = live_gateway().expect("live tests need ENDPOINT/ACCESS_KEY/SECRET_KEY");
    let bucket = "quay-e2e-location";

    if !gateway.bucket_exists(bucket).await.unwrap() {
        gateway.create_bucket(bucket, None).await.unwrap();
    }

    let location = gateway.get_bucket_location(bucket).await.unwrap();
    assert!(!location.is_empty());

    gateway.delete_bucket(bucket).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_health_monitor_against_live_service() {
    if !live_tests_enabled() {
        return;
    }

    let gateway = Arc::new(live_gateway().expect("live tests need ENDPOINT/ACCESS_KEY/SECRET_KEY"));
    let monitor = HealthMonitor::new(gateway);

    let state = monitor.check_now().await;
    assert_eq!(state.status, HealthStatus::Connected);
    assert!(state.last_checked_at.is_some());
}
