// Service trait for liveness checking

use std::time::Duration;

/// Anything a liveness probe can ask.
pub trait Service: Send + Sync {
    /// Answers within `timeout`; blocking is allowed.
    fn is_alive(&self, timeout: Duration) -> bool;
}
