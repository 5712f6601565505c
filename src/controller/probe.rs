// Liveness endpoints.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::http::{Controller, HEALTHZ_PATH, LIVEZ_PATH};
use crate::liveness;

/// Answers `/livez` and `/healthz` from the liveness probe.
#[derive(Clone)]
pub struct LivenessProbeController {
    probe: Arc<liveness::Probe>,
}

impl LivenessProbeController {
    pub fn new(probe: Arc<liveness::Probe>) -> Self {
        Self { probe }
    }

    async fn probe(&self) -> Response {
        if self.probe.is_alive_async().await {
            (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
                .into_response()
        }
    }
}

impl Controller for LivenessProbeController {
    fn add_route(&self, router: Router) -> Router {
        let livez = self.clone();
        let healthz = self.clone();
        router
            .route(LIVEZ_PATH, get(move || async move { livez.probe().await }))
            .route(HEALTHZ_PATH, get(move || async move { healthz.probe().await }))
    }
}
