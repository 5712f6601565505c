// Liveness probing of the services a process hosts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::timeout;
use tracing::warn;

pub mod error;
pub mod prober;
pub mod service;

pub use error::TimeoutIsTooShortError;
pub use prober::Prober;
pub use service::Service;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Asks every watched service whether it is alive, bounded by a timeout.
pub struct Probe {
    services: RwLock<Vec<Arc<dyn Service>>>,
    timeout: Duration,
}

impl Probe {
    pub fn new(timeout_duration: Duration) -> Self {
        let timeout = if timeout_duration < MIN_TIMEOUT {
            warn!(
                component = "liveness",
                event = "timeout_too_short",
                error = %TimeoutIsTooShortError,
                "min timeout duration is 1ms (timeout set up as 10ms as a more reasonable value)"
            );
            Duration::from_millis(10)
        } else {
            timeout_duration
        };

        Self {
            services: RwLock::new(Vec::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Adds `services` to the watched set.
    pub fn watch(&self, services: Vec<Arc<dyn Service>>) {
        self.services.write().extend(services);
    }

    /// True when every watched service answers alive within the timeout. A
    /// probe with nothing to watch reports alive.
    pub async fn is_alive_async(&self) -> bool {
        let services = self.services.read().clone();
        let probe_timeout = self.timeout;
        let check = tokio::task::spawn_blocking(move || {
            services.iter().all(|s| s.is_alive(probe_timeout))
        });

        match timeout(probe_timeout, check).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                warn!(
                    component = "liveness",
                    event = "check_failed",
                    error = %e,
                    "liveness check task failed"
                );
                false
            }
            Err(_) => {
                warn!(
                    component = "liveness",
                    event = "deadline_exceeded",
                    timeout_ms = probe_timeout.as_millis() as u64,
                    "liveness probe deadline exceeded while checking services"
                );
                false
            }
        }
    }
}

#[async_trait]
impl Prober for Probe {
    fn watch(&self, services: Vec<Arc<dyn Service>>) {
        Probe::watch(self, services)
    }

    async fn is_alive(&self) -> bool {
        self.is_alive_async().await
    }
}
