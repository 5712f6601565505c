// Graceful shutdown: wait for a signal, keep serving through the incoming
// traffic grace period, cancel the servers and wait for them to drain.

use anyhow::Result;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};


#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded")]
pub struct TimeoutError;

#[derive(Clone)]
pub struct GracefulShutdown {
    /// Cancelled once listeners must stop accepting.
    shutdown_token: CancellationToken,
    /// Cancelled when shutdown is requested from inside the process.
    requested: CancellationToken,
    graceful_timeout: Duration,
    grace_period: Duration,
    running: watch::Sender<usize>,
}

impl GracefulShutdown {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            shutdown_token,
            requested: CancellationToken::new(),
            graceful_timeout: crate::config::DEFAULT_TIMEOUT_GRACEFUL_SHUTDOWN,
            grace_period: crate::config::DEFAULT_INCOMING_TRAFFIC_GRACE_PERIOD,
            running: watch::Sender::new(0),
        }
    }

    /// Upper bound on waiting for registered tasks after cancellation.
    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }

    /// How long listeners keep accepting after a shutdown signal.
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Registers `n` tasks to wait for.
    pub fn add(&self, n: usize) {
        self.running.send_modify(|count| *count += n);
    }

    /// Marks one registered task as finished.
    pub fn done(&self) {
        self.running.send_modify(|count| *count = count.saturating_sub(1));
    }

    pub fn running(&self) -> usize {
        *self.running.borrow()
    }

    /// Starts shutdown as if an OS signal had arrived.
    pub fn request(&self) {
        self.requested.cancel();
    }

    /// Waits for SIGINT, SIGTERM or [`request`](Self::request), then runs
    /// the shutdown sequence. Cancelling the shutdown token directly skips
    /// the grace period.
    pub async fn await_shutdown(&self) -> Result<()> {
        let signalled = tokio::select! {
            _ = signal::ctrl_c() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGINT", "cancellation started");
                true
            }
            _ = terminate() => {
                info!(component = "graceful-shutdown", event = "os_signal", signal = "SIGTERM", "cancellation started");
                true
            }
            _ = self.requested.cancelled() => {
                info!(component = "graceful-shutdown", event = "requested", "cancellation started");
                true
            }
            _ = self.shutdown_token.cancelled() => {
                info!(component = "graceful-shutdown", event = "ctx_done", "cancellation started");
                false
            }
        };

        if signalled && !self.grace_period.is_zero() {
            info!(
                component = "graceful-shutdown",
                event = "grace_period",
                grace_period_ms = self.grace_period.as_millis() as u64,
                "still accepting traffic during grace period"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.grace_period) => {}
                _ = self.shutdown_token.cancelled() => {}
            }
        }

        self.cancel_and_await_with_timeout().await
    }

    async fn cancel_and_await_with_timeout(&self) -> Result<()> {
        self.shutdown_token.cancel();

        let mut running = self.running.subscribe();
        let drained = timeout(self.graceful_timeout, running.wait_for(|count| *count == 0))
            .await
            .map(|_| ());
        match drained {
            Ok(_) => {
                info!(
                    component = "graceful-shutdown",
                    event = "shutdown_success",
                    "service was gracefully shut down"
                );
                Ok(())
            }
            Err(_) => {
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_ms = self.graceful_timeout.as_millis() as u64,
                    still_running = self.running(),
                    "not all tasks were closed within timeout"
                );
                Err(TimeoutError.into())
            }
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(
                component = "graceful-shutdown",
                event = "sigterm_unavailable",
                error = %e,
                "cannot listen for SIGTERM"
            );
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
