// Integration test harness: one application per test, on ephemeral ports.

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::app::{App, Bound};
use crate::config::{self, Config, ConfigTrait};
use crate::instance::HostedInstance;
use crate::liveness;
use crate::shutdown::GracefulShutdown;

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Test configuration with the given bearer token and liveness port.
pub fn test_config(token: Option<&str>, liveness_port: Option<u16>) -> Config {
    let mut cfg = config::new_test_config();
    if let Some(auth) = cfg.photon.auth.as_mut() {
        auth.token = token.map(str::to_string);
    }
    if let Some(api) = cfg.photon.api.as_mut() {
        api.liveness_port = liveness_port;
    }
    cfg
}

/// Router of an assembled application that is not listening.
pub fn router(cfg: Config, instance: Arc<HostedInstance>) -> axum::Router {
    let probe = Arc::new(liveness::Probe::new(cfg.probe_timeout()));
    App::new(CancellationToken::new(), cfg, instance, probe).unwrap().router()
}

/// A running application.
pub struct TestApp {
    pub app: App,
    pub bound: Bound,
    gsh: GracefulShutdown,
    shutdown_token: CancellationToken,
}

impl TestApp {
    /// Assembles and serves `instance`.
    pub async fn start(cfg: Config, instance: Arc<HostedInstance>) -> anyhow::Result<Self> {
        let shutdown_token = CancellationToken::new();
        let gsh = GracefulShutdown::new(shutdown_token.clone())
            .with_graceful_timeout(cfg.graceful_timeout())
            .with_grace_period(cfg.incoming_traffic_grace_period());
        let probe = Arc::new(liveness::Probe::new(cfg.probe_timeout()));

        let app = App::new(shutdown_token.clone(), cfg, instance, probe)?;
        let bound = app.serve(&gsh).await?;
        Ok(Self {
            app,
            bound,
            gsh,
            shutdown_token,
        })
    }

    pub fn url(&self, path: &str) -> String {
        local_url(self.bound.addr, path)
    }

    pub fn liveness_url(&self, path: &str) -> Option<String> {
        self.bound.liveness_addr.map(|addr| local_url(addr, path))
    }

    pub fn running(&self) -> usize {
        self.gsh.running()
    }

    /// Cancels every listener and waits for them to stop.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown_token.cancel();
        self.gsh.await_shutdown().await
    }
}

fn local_url(addr: SocketAddr, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", addr.port(), path)
}
