//! Connection health monitoring
//!
//! A [`HealthMonitor`] drives the connection-test probe on a timer and
//! publishes a small state machine for presentation layers:
//!
//! ```text
//! disconnected -> connecting -> { connected, error }
//! connected    -> connecting      on every periodic re-check or manual trigger
//! error        -> connecting      on manual trigger only
//! ```
//!
//! The monitor starts `disconnected` and moves to `connecting` as soon as
//! configuration is available. Its timer task is cancellable and aborted on
//! drop so no periodic work outlives the monitor.

use crate::error::GatewayResult;
use crate::gateway::Gateway;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Interval between periodic re-checks while connected
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Connection status as shown to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No usable configuration
    Disconnected,

    /// Probe in flight
    Connecting,

    /// Last probe succeeded
    Connected,

    /// Last probe failed
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Disconnected => "disconnected",
            HealthStatus::Connecting => "connecting",
            HealthStatus::Connected => "connected",
            HealthStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Published health snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    /// Current status
    pub status: HealthStatus,

    /// When the last successful check completed
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Classified message of the last failed check
    pub error: Option<String>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            status: HealthStatus::Disconnected,
            last_checked_at: None,
            error: None,
        }
    }
}

/// Seam between the monitor and whatever answers the connection test
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    /// Whether a usable configuration is currently active
    fn is_configured(&self) -> bool;

    /// Run the connection test
    async fn check(&self) -> GatewayResult<bool>;
}

#[async_trait]
impl ConnectionProbe for Gateway {
    fn is_configured(&self) -> bool {
        self.store().is_configured()
    }

    async fn check(&self) -> GatewayResult<bool> {
        self.test_connection().await
    }
}

/// Periodic connection health monitor
pub struct HealthMonitor {
    probe: Arc<dyn ConnectionProbe>,
    interval: Duration,
    tx: watch::Sender<HealthState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Monitor with the default 30-second re-check interval
    pub fn new(probe: Arc<dyn ConnectionProbe>) -> Self {
        Self::with_interval(probe, DEFAULT_CHECK_INTERVAL)
    }

    /// Monitor with an explicit re-check interval
    pub fn with_interval(probe: Arc<dyn ConnectionProbe>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(HealthState::default());
        Self {
            probe,
            interval,
            tx,
            task: Mutex::new(None),
        }
    }

    /// Current state snapshot
    pub fn state(&self) -> HealthState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.tx.subscribe()
    }

    /// Manual trigger: run one check now and return the resulting state
    ///
    /// The only way out of `error` or `disconnected` besides configuration
    /// becoming available.
    pub async fn check_now(&self) -> HealthState {
        Self::run_check(&self.probe, &self.tx).await
    }

    async fn run_check(
        probe: &Arc<dyn ConnectionProbe>,
        tx: &watch::Sender<HealthState>,
    ) -> HealthState {
        if !probe.is_configured() {
            let state = HealthState::default();
            let _ = tx.send(state.clone());
            return state;
        }

        let previous_check = tx.borrow().last_checked_at;
        let _ = tx.send(HealthState {
            status: HealthStatus::Connecting,
            last_checked_at: previous_check,
            error: None,
        });

        let state = match probe.check().await {
            Ok(true) => HealthState {
                status: HealthStatus::Connected,
                last_checked_at: Some(Utc::now()),
                error: None,
            },
            Ok(false) => HealthState {
                status: HealthStatus::Error,
                last_checked_at: previous_check,
                error: Some("Connection test failed".to_string()),
            },
            Err(err) => HealthState {
                status: HealthStatus::Error,
                last_checked_at: previous_check,
                error: Some(err.to_string()),
            },
        };

        debug!(status = %state.status, "connection check finished");
        let _ = tx.send(state.clone());
        state
    }

    /// Spawn the timer task; idempotent while a task is running
    ///
    /// Checks immediately when configuration is already available, then on
    /// every tick: re-checks while `connected`, picks up newly-arrived
    /// configuration from `disconnected`, and leaves `error` alone until a
    /// manual trigger.
    pub fn start(&self) {
        let mut guard = self.task.lock().expect("health task lock poisoned");
        if guard.is_some() {
            return;
        }

        let probe = self.probe.clone();
        let tx = self.tx.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            if probe.is_configured() {
                Self::run_check(&probe, &tx).await;
            }

            let mut ticker = tokio::time::interval(period);
            // The first tick of a fresh interval fires immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let status = tx.borrow().status;
                match status {
                    HealthStatus::Connected => {
                        Self::run_check(&probe, &tx).await;
                    }
                    HealthStatus::Disconnected if probe.is_configured() => {
                        Self::run_check(&probe, &tx).await;
                    }
                    _ => {}
                }
            }
        });

        *guard = Some(handle);
    }

    /// Cancel the timer task
    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().expect("health task lock poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
