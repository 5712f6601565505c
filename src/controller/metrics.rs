//! Prometheus exporter and the `/metrics` endpoint.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::http::{Controller, METRICS_PATH};
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, LATENCY_BUCKETS};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the process-wide Prometheus recorder. Safe to call more than
/// once; later calls return the handle installed first.
///
/// No HTTP listener is started by the exporter itself, so this works both
/// before and inside a tokio runtime.
pub fn init_prometheus_exporter() -> anyhow::Result<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
                LATENCY_BUCKETS,
            )?
            .install_recorder()?;
        Ok(handle)
    })
}

#[derive(Clone, Default)]
pub struct PrometheusMetricsController;

impl PrometheusMetricsController {
    pub fn new() -> Self {
        Self
    }

    async fn get_metrics() -> impl IntoResponse {
        let body = match PROMETHEUS_HANDLE.get() {
            Some(handle) => {
                handle.run_upkeep();
                handle.render()
            }
            None => String::new(),
        };
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
    }
}

impl Controller for PrometheusMetricsController {
    fn add_route(&self, router: Router) -> Router {
        router.route(METRICS_PATH, get(Self::get_metrics))
    }
}
