//! Transport client construction
//!
//! A [`GatewayClient`] binds one `aws_sdk_s3::Client` to the configuration
//! snapshot it was built from and the store version current at build time.
//! Handles are never mutated after construction; a configuration change
//! produces a new handle (see `Gateway::client`).

use crate::config::ConnectionConfig;
use crate::error::GatewayResult;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::debug;

/// Per-operation timeout applied to every transport call
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Handle bound to exactly one configuration snapshot
#[derive(Debug, Clone)]
pub struct GatewayClient {
    inner: S3Client,
    config: ConnectionConfig,
    version: u64,
}

impl GatewayClient {
    /// Build a client from a validated configuration snapshot
    ///
    /// Path-style addressing is always forced: S3-compatible services
    /// (MinIO, LocalStack) do not resolve virtual-host bucket names.
    pub(crate) async fn connect(config: ConnectionConfig, version: u64) -> GatewayResult<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "quay-explicit",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(OPERATION_TIMEOUT)
            .build();

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .endpoint_url(endpoint.as_str())
            .force_path_style(true)
            .timeout_config(timeout_config)
            .build();

        debug!(endpoint = %endpoint, region = %config.region, version, "constructed storage client");

        Ok(Self {
            inner: S3Client::from_conf(s3_config),
            config,
            version,
        })
    }

    /// The underlying transport client
    pub fn inner(&self) -> &S3Client {
        &self.inner
    }

    /// The configuration snapshot this handle was built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Store version this handle was built at
    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_connect_with_valid_config() {
        let config = ConnectionConfig::new("localhost", "minioadmin", "minioadmin");
        let client = GatewayClient::connect(config.clone(), 7).await.unwrap();
        assert_eq!(client.version(), 7);
        assert_eq!(client.config(), &config);
    }

    #[tokio::test]
    async fn test_connect_rejects_unusable_config() {
        let config = ConnectionConfig::new("localhost", "", "");
        let err = GatewayClient::connect(config, 0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationMissing);
        assert!(err.message.contains("access_key"));
        assert!(err.message.contains("secret_key"));
    }
}
