// Hosting application: eager initialization, the servers and their
// lifecycle under graceful shutdown.

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::instance::HostedInstance;
use crate::liveness;
use crate::shutdown::GracefulShutdown;

use super::server::HttpServer;

/// Addresses the application listens on.
#[derive(Debug, Clone, Copy)]
pub struct Bound {
    pub addr: SocketAddr,
    pub liveness_addr: Option<SocketAddr>,
}

#[derive(Clone)]
pub struct App {
    cfg: Config,
    shutdown_token: CancellationToken,
    instance: Arc<HostedInstance>,
    probe: Arc<liveness::Probe>,
    server: Arc<HttpServer>,
    liveness_server: Option<Arc<HttpServer>>,
}

impl App {
    /// Assembles the servers for `instance`. Nothing listens yet.
    pub fn new(
        shutdown_token: CancellationToken,
        cfg: Config,
        instance: Arc<HostedInstance>,
        probe: Arc<liveness::Probe>,
    ) -> Result<Self> {
        if cfg.is_metrics_enabled() {
            if let Err(e) = crate::controller::metrics::init_prometheus_exporter() {
                warn!(
                    component = "app",
                    event = "metrics_unavailable",
                    error = %e,
                    "prometheus exporter not installed"
                );
            }
        }

        let server = HttpServer::new(shutdown_token.clone(), &cfg, &instance, Arc::clone(&probe))
            .context("failed to assemble the unit's routes")?;
        let liveness_server = cfg
            .liveness_port()
            .map(|_| Arc::new(HttpServer::liveness(shutdown_token.clone(), &cfg, Arc::clone(&probe))));

        Ok(Self {
            cfg,
            shutdown_token,
            instance,
            probe,
            server: Arc::new(server),
            liveness_server,
        })
    }

    pub fn instance(&self) -> &Arc<HostedInstance> {
        &self.instance
    }

    /// The main router with all middlewares, for in-process requests.
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Starts the liveness listener, runs initialization, then starts the
    /// main listener. Initialization failure aborts the start. Each listener
    /// is registered with `gsh` until it stops.
    pub async fn serve(&self, gsh: &GracefulShutdown) -> Result<Bound> {
        self.probe.watch(vec![
            Arc::clone(&self.instance) as Arc<dyn liveness::Service>,
            Arc::new(self.clone()) as Arc<dyn liveness::Service>,
        ]);

        let liveness_addr = match &self.liveness_server {
            Some(server) => {
                let port = self.cfg.liveness_port().unwrap_or_default();
                let listener = server.bind(port).await?;
                let addr = listener.local_addr()?;
                self.spawn(Arc::clone(server), listener, gsh);
                Some(addr)
            }
            None => None,
        };

        if let Err(e) = self.instance.ensure_initialized().await {
            error!(
                component = "app",
                event = "init_failed",
                unit = self.instance.name(),
                error = %e,
                "unit initialization failed, refusing to serve"
            );
            self.close();
            return Err(e).context("unit initialization failed");
        }

        let listener = self.server.bind(self.cfg.port()).await?;
        let addr = listener.local_addr()?;
        self.spawn(Arc::clone(&self.server), listener, gsh);

        info!(
            component = "app",
            event = "started",
            unit = self.instance.name(),
            addr = %addr,
            liveness_addr = ?liveness_addr,
            "application lifecycle"
        );

        Ok(Bound { addr, liveness_addr })
    }

    fn spawn(&self, server: Arc<HttpServer>, listener: tokio::net::TcpListener, gsh: &GracefulShutdown) {
        gsh.add(1);
        let gsh = gsh.clone();
        let app = self.clone();
        tokio::task::spawn(async move {
            if let Err(e) = server.serve_on(listener).await {
                error!(
                    component = "app",
                    scope = "server",
                    event = "serve_failed",
                    name = server.name(),
                    error = %e,
                    "server failed to serve"
                );
                app.close();
            }
            gsh.done();
        });
    }

    /// Main server is still serving and the instance has not failed.
    pub fn is_alive(&self) -> bool {
        if !self.server.is_alive() {
            warn!(
                component = "app",
                scope = "http_server",
                event = "gone_away",
                "http server has gone away"
            );
            return false;
        }
        true
    }

    /// Stops every listener.
    pub fn close(&self) {
        self.shutdown_token.cancel();
        info!(
            component = "app",
            event = "stopped",
            unit = self.instance.name(),
            "application lifecycle"
        );
    }
}

impl liveness::Service for App {
    fn is_alive(&self, _timeout: Duration) -> bool {
        App::is_alive(self)
    }
}
