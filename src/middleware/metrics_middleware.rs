//! Request count, latency and in-flight metrics keyed by matched route.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
    Router,
};

use super::middleware::Middleware;
use crate::metrics;

/// Handler label for requests that matched no route and were not taken by a
/// default entry point.
pub const UNMATCHED_HANDLER: &str = "none";

#[derive(Clone, Default)]
pub struct MetricsMiddleware;

struct InFlight {
    handler: String,
    method: String,
}

impl InFlight {
    fn start(handler: String, method: String) -> Self {
        metrics::inc_in_progress(&handler, &method);
        Self { handler, method }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::dec_in_progress(&self.handler, &self.method);
    }
}

async fn record(req: Request, next: Next) -> Response {
    let handler = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_HANDLER.to_string());
    let method = req.method().as_str().to_string();

    let in_flight = InFlight::start(handler, method);
    let start = Instant::now();
    let response = next.run(req).await;
    let handler = match response.extensions().get::<metrics::FallbackRoute>() {
        Some(route) if in_flight.handler == UNMATCHED_HANDLER => route.0.as_str(),
        _ => in_flight.handler.as_str(),
    };
    metrics::record_request(
        handler,
        &in_flight.method,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

impl Middleware for MetricsMiddleware {
    fn apply(&self, router: Router) -> Router {
        router.layer(axum::middleware::from_fn(record))
    }
}
