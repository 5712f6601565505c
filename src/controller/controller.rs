// HTTP controller trait for route registration.

use axum::Router;

/// Trait for adding routes to the HTTP server.
pub trait Controller: Send + Sync {
    /// Adds routes to the router.
    ///
    /// Commonly may be represented as:
    /// ```rust
    /// # use axum::{Router, routing::get};
    /// # async fn livez() -> &'static str { "ok" }
    /// let router: Router<()> = Router::new().route("/livez", get(livez));
    /// # let _ = router;
    /// ```
    fn add_route(&self, router: Router) -> Router;
}
