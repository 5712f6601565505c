//! Router assembly from controllers and middlewares, served on a bound
//! listener until the shutdown token fires.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::controller::controller::Controller;
use crate::middleware::middleware::Middleware;

/// One listener serving a router built from controllers and middlewares.
pub struct HttpServer {
    shutdown_token: CancellationToken,
    name: String,
    router: Router,
}

impl HttpServer {
    pub fn new(
        shutdown_token: CancellationToken,
        name: impl Into<String>,
        controllers: Vec<Box<dyn Controller>>,
        middlewares: Vec<Box<dyn Middleware>>,
    ) -> Arc<Self> {
        let router = Self::build_router(controllers);
        let router = Self::merge_middlewares(router, middlewares);

        Arc::new(Self {
            shutdown_token,
            name: name.into(),
            router,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully assembled router, middlewares included.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serves on a bound listener; in-flight requests drain on shutdown.
    pub async fn serve_on(&self, listener: TcpListener) -> Result<()> {
        let name = self.name.as_str();
        let addr = listener.local_addr().context("listener has no local address")?;

        info!(
            component = "server",
            event = "started",
            name = name,
            addr = %addr,
            "server started"
        );

        let shutdown_token = self.shutdown_token.clone();
        let serve_future = axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        });

        if let Err(e) = serve_future.await {
            error!(
                component = "server",
                event = "listen_and_serve_failed",
                name = name,
                addr = %addr,
                error = %e,
                "server failed to listen and serve"
            );
            return Err(e.into());
        }

        info!(
            component = "server",
            event = "stopped",
            name = name,
            addr = %addr,
            "server stopped"
        );

        Ok(())
    }

    fn build_router(controllers: Vec<Box<dyn Controller>>) -> Router {
        controllers
            .iter()
            .fold(Router::new(), |router, controller| controller.add_route(router))
    }

    /// Applies middlewares so that the first one in the list is outermost.
    fn merge_middlewares(router: Router, middlewares: Vec<Box<dyn Middleware>>) -> Router {
        middlewares
            .iter()
            .rev()
            .fold(router, |router, middleware| middleware.apply(router))
    }
}
