//! Connection configuration and the process-wide configuration store
//!
//! One configuration is active at a time. An explicitly saved configuration
//! wins over environment-derived defaults; clearing it falls back to the
//! environment, or leaves the gateway unconfigured. The store's version
//! counter is how the client cache knows to rebuild.

use crate::error::{ErrorKind, GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use url::Url;

/// Default service port
pub const DEFAULT_PORT: u16 = 9000;

/// Default region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variables consulted when no configuration has been saved
pub const ENV_ENDPOINT: &str = "ENDPOINT";
pub const ENV_PORT: &str = "PORT";
pub const ENV_USE_TLS: &str = "USE_TLS";
pub const ENV_ACCESS_KEY: &str = "ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "SECRET_KEY";
pub const ENV_REGION: &str = "REGION";

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Host name or address of the service, without scheme
    pub endpoint: String,

    /// Service port
    pub port: u16,

    /// Use HTTPS when talking to the endpoint
    pub use_tls: bool,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Region used for signing and bucket placement
    pub region: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            port: DEFAULT_PORT,
            use_tls: false,
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with the required fields and default port/region
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration, naming every missing required field
    pub fn validate(&self) -> GatewayResult<()> {
        let mut missing = Vec::new();
        if self.endpoint.trim().is_empty() {
            missing.push("endpoint");
        }
        if self.access_key.trim().is_empty() {
            missing.push("access_key");
        }
        if self.secret_key.trim().is_empty() {
            missing.push("secret_key");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::configuration_missing(&missing))
        }
    }

    /// Build the endpoint URL from host, port, and TLS flag
    pub fn endpoint_url(&self) -> GatewayResult<Url> {
        let scheme = if self.use_tls { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}:{}", self.endpoint, self.port)).map_err(|e| {
            GatewayError::new(
                ErrorKind::ConfigurationMissing,
                format!("endpoint is not a valid host: {e}"),
            )
        })
    }

    /// Derive a configuration from process environment variables
    ///
    /// Returns `None` when any required variable is absent, mirroring
    /// `validate()`: `ENDPOINT`, `ACCESS_KEY`, and `SECRET_KEY` are
    /// required; `PORT`, `USE_TLS`, and `REGION` default.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Derive a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let required = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let endpoint = required(ENV_ENDPOINT)?;
        let access_key = required(ENV_ACCESS_KEY)?;
        let secret_key = required(ENV_SECRET_KEY)?;

        let port = lookup(ENV_PORT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let use_tls = lookup(ENV_USE_TLS).as_deref() == Some("true");
        let region = required(ENV_REGION).unwrap_or_else(|| DEFAULT_REGION.to_string());

        Some(Self {
            endpoint,
            port,
            use_tls,
            access_key,
            secret_key,
            region,
        })
    }
}

/// Process-wide holder of the active connection configuration
///
/// Cheap to clone; all clones share one snapshot. Reads clone the current
/// snapshot without blocking writers for longer than the copy; writes swap
/// the snapshot atomically and bump the version counter consumed by the
/// client cache. Environment changes after process start are not tracked
/// by the version counter.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    saved: RwLock<Option<ConnectionConfig>>,
    version: AtomicU64,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a configuration explicitly, replacing any previous one
    pub fn set(&self, config: ConnectionConfig) {
        *self.inner.saved.write().expect("config store poisoned") = Some(config);
        self.inner.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop the saved configuration, returning to environment fallback
    pub fn clear(&self) {
        *self.inner.saved.write().expect("config store poisoned") = None;
        self.inner.version.fetch_add(1, Ordering::SeqCst);
    }

    /// The explicitly saved configuration, if any
    pub fn saved(&self) -> Option<ConnectionConfig> {
        self.inner.saved.read().expect("config store poisoned").clone()
    }

    /// The active configuration: saved wins, environment is the fallback
    pub fn active(&self) -> Option<ConnectionConfig> {
        self.saved().or_else(ConnectionConfig::from_env)
    }

    /// Whether a usable configuration is currently active
    pub fn is_configured(&self) -> bool {
        self.active().is_some_and(|c| c.validate().is_ok())
    }

    /// Monotone counter bumped on every `set`/`clear`
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }
}
