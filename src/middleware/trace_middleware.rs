use axum::Router;
use tower_http::trace::TraceLayer;

use super::middleware::Middleware;

/// Emits a tracing span per request.
#[derive(Clone, Default)]
pub struct TraceMiddleware;

impl Middleware for TraceMiddleware {
    fn apply(&self, router: Router) -> Router {
        router.layer(TraceLayer::new_for_http())
    }
}
