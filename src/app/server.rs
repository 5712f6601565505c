// HTTP servers of the application: the main one with the full stack and an
// optional liveness-only listener.

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigTrait};
use crate::controller::{self, AssemblyError};
use crate::http::{Controller, Middleware};
use crate::instance::HostedInstance;
use crate::liveness;
use crate::middleware;

const STARTING: u8 = 0;
const SERVING: u8 = 1;
const STOPPED: u8 = 2;

/// Wraps the generic server and tracks whether it is still serving.
pub struct HttpServer {
    server: Arc<crate::http::HttpServer>,
    state: Arc<AtomicU8>,
}

impl HttpServer {
    /// Main server: system endpoints plus the instance's entry points behind
    /// CORS, tracing, auth and metrics.
    pub fn new(
        ctx: CancellationToken,
        cfg: &Config,
        instance: &Arc<HostedInstance>,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self, AssemblyError> {
        let controllers = Self::controllers(cfg, instance, probe)?;
        let middlewares = Self::middlewares(cfg);
        Ok(Self::wrap(crate::http::HttpServer::new(
            ctx,
            cfg.name(),
            controllers,
            middlewares,
        )))
    }

    /// Second listener answering only the liveness endpoints.
    pub fn liveness(ctx: CancellationToken, cfg: &Config, probe: Arc<liveness::Probe>) -> Self {
        let controllers: Vec<Box<dyn Controller>> = vec![Box::new(controller::LivenessProbeController::new(probe))];
        Self::wrap(crate::http::HttpServer::new(
            ctx,
            format!("{}-liveness", cfg.name()),
            controllers,
            Vec::new(),
        ))
    }

    fn wrap(server: Arc<crate::http::HttpServer>) -> Self {
        Self {
            server,
            state: Arc::new(AtomicU8::new(STARTING)),
        }
    }

    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// False once the server has stopped serving.
    pub fn is_alive(&self) -> bool {
        self.state.load(Ordering::Acquire) != STOPPED
    }

    pub async fn bind(&self, port: u16) -> Result<TcpListener> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("{}: failed to bind {addr}", self.name()))
    }

    /// Serves on `listener` until cancelled (blocking call).
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        self.state.store(SERVING, Ordering::Release);
        let result = self.server.serve_on(listener).await;
        self.state.store(STOPPED, Ordering::Release);
        result
    }

    fn controllers(
        cfg: &Config,
        instance: &Arc<HostedInstance>,
        probe: Arc<liveness::Probe>,
    ) -> Result<Vec<Box<dyn Controller>>, AssemblyError> {
        let mut controllers: Vec<Box<dyn Controller>> = vec![
            // Liveness on the main port
            Box::new(controller::LivenessProbeController::new(probe)),
            // Interface document
            Box::new(controller::OpenApiController::new(instance)),
            // Browsers' favicon requests
            Box::new(controller::FaviconController),
        ];
        if cfg.is_metrics_enabled() {
            controllers.push(Box::new(controller::PrometheusMetricsController::new()));
        }
        // Entry points, mounts and the catch-all
        controllers.push(Box::new(controller::EntryPointController::new(instance, cfg.max_body_bytes())?));
        Ok(controllers)
    }

    /// Listed outermost first.
    fn middlewares(cfg: &Config) -> Vec<Box<dyn Middleware>> {
        let mut middlewares: Vec<Box<dyn Middleware>> = vec![
            Box::new(middleware::CorsMiddleware),
            Box::new(middleware::TraceMiddleware),
            Box::new(middleware::AuthMiddleware::new(cfg.token())),
        ];
        if cfg.is_metrics_enabled() {
            middlewares.push(Box::new(middleware::MetricsMiddleware));
        }
        middlewares
    }
}
