use axum::{http::StatusCode, routing::get, Router};

use crate::http::{Controller, FAVICON_PATH};

/// Browsers ask for a favicon on every visit; answer with no content.
#[derive(Clone, Default)]
pub struct FaviconController;

impl Controller for FaviconController {
    fn add_route(&self, router: Router) -> Router {
        router.route(FAVICON_PATH, get(|| async { StatusCode::NO_CONTENT }))
    }
}
