use axum::Router;
use tower_http::cors::CorsLayer;

use super::middleware::Middleware;

/// Allows any origin, method and header, credentials included.
#[derive(Clone, Default)]
pub struct CorsMiddleware;

impl Middleware for CorsMiddleware {
    fn apply(&self, router: Router) -> Router {
        router.layer(CorsLayer::very_permissive())
    }
}
