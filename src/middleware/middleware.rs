// Middleware interface.

use axum::Router;

/// Middleware trait for HTTP request/response processing.
pub trait Middleware: Send + Sync {
    /// Wraps every route and the fallback of `router`.
    fn apply(&self, router: Router) -> Router;
}
