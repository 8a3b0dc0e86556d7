//! Readiness gating for spawned tunnel processes.
//!
//! Waiting happens in two sequential phases: first until the process exists,
//! then until it reports itself stable. A failing status check ends the wait
//! immediately; there is no retry.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Status channel of a spawned process.
#[async_trait]
pub trait TunnelStatus: Send + Sync {
    /// Whether the process has come up far enough to be queried.
    async fn is_running(&self) -> Result<bool>;

    /// Whether the process reports itself as stable.
    async fn is_stable(&self) -> Result<bool>;

    /// Asks the process to terminate.
    async fn shutdown(&self) -> Result<()>;
}

/// State of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Nothing has been polled yet.
    Starting,
    /// Waiting for the process to exist or to become stable.
    Polling,
    /// The process reported stable.
    Stable,
    /// The wait was cancelled.
    Cancelled,
}

/// Polling intervals for readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    /// Interval while waiting for the process to exist.
    #[serde(default = "default_appear_interval")]
    pub appear_interval: Duration,
    /// Interval while waiting for the process to become stable.
    #[serde(default = "default_stable_interval")]
    pub stable_interval: Duration,
    /// Upper bound on how long cleanup may take.
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout: Duration,
}

fn default_appear_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_stable_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_cleanup_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            appear_interval: default_appear_interval(),
            stable_interval: default_stable_interval(),
            cleanup_timeout: default_cleanup_timeout(),
        }
    }
}

/// Waits for a [`TunnelStatus`] to become stable.
#[derive(Debug)]
pub struct ReadinessPoller {
    config: ReadinessConfig,
    state: ReadinessState,
}

impl ReadinessPoller {
    /// Creates a poller in the [`ReadinessState::Starting`] state.
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            config,
            state: ReadinessState::Starting,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReadinessState {
        self.state
    }

    /// Blocks until `status` reports stable.
    ///
    /// Returns [`Error::Cancelled`] as soon as `cancel` fires, without
    /// finishing the current sleep or status call, and
    /// [`Error::StatusCheckFailed`] on the first failing status call.
    pub async fn wait_until_stable(
        &mut self,
        status: &dyn TunnelStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.state = ReadinessState::Polling;

        tracing::info!("waiting for tunnel process to start");
        loop {
            if self.check(status.is_running(), cancel).await? {
                break;
            }
            self.sleep(self.config.appear_interval, cancel).await?;
        }

        tracing::info!("waiting for tunnel to become stable");
        loop {
            if self.check(status.is_stable(), cancel).await? {
                self.state = ReadinessState::Stable;
                tracing::info!("tunnel is stable");
                return Ok(());
            }
            self.sleep(self.config.stable_interval, cancel).await?;
        }
    }

    /// Runs `wait_until_stable`, then `work`, then [`cleanup`].
    ///
    /// Cleanup runs however the wait or the work ends.
    pub async fn gated<T, F, Fut>(
        &mut self,
        status: &dyn TunnelStatus,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = match self.wait_until_stable(status, cancel).await {
            Ok(()) => work().await,
            Err(e) => Err(e),
        };
        cleanup(status, self.config.cleanup_timeout).await;
        result
    }

    async fn check<Fut>(&mut self, call: Fut, cancel: &CancellationToken) -> Result<bool>
    where
        Fut: Future<Output = Result<bool>>,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.state = ReadinessState::Cancelled;
                return Err(Error::Cancelled);
            }
            result = call => result,
        };

        result.map_err(|e| match e {
            Error::StatusCheckFailed(_) | Error::Cancelled => e,
            other => Error::StatusCheckFailed(other.to_string()),
        })
    }

    async fn sleep(&mut self, interval: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                self.state = ReadinessState::Cancelled;
                Err(Error::Cancelled)
            }
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }
}

/// Best-effort termination of a tunnel process.
///
/// Failures and timeouts are logged and otherwise ignored.
pub async fn cleanup(status: &dyn TunnelStatus, timeout: Duration) {
    match tokio::time::timeout(timeout, status.shutdown()).await {
        Ok(Ok(())) => tracing::debug!("tunnel shut down"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to stop tunnel"),
        Err(_) => tracing::warn!(timeout = ?timeout, "timed out stopping tunnel"),
    }
}
