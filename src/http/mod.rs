// HTTP module: server plumbing and the fixed system paths.

#[path = "server/server.rs"]
pub mod server;

pub use crate::controller::controller::Controller;
pub use crate::middleware::middleware::Middleware;
pub use server::HttpServer;

pub const LIVEZ_PATH: &str = "/livez";
pub const HEALTHZ_PATH: &str = "/healthz";
pub const METRICS_PATH: &str = "/metrics";
pub const OPENAPI_PATH: &str = "/openapi.json";
pub const FAVICON_PATH: &str = "/favicon.ico";

/// Paths served by the runtime itself. Entry points may not claim them and
/// they bypass bearer auth.
pub const SYSTEM_PATHS: [&str; 5] = [LIVEZ_PATH, HEALTHZ_PATH, METRICS_PATH, OPENAPI_PATH, FAVICON_PATH];

pub fn is_system_path(path: &str) -> bool {
    SYSTEM_PATHS.contains(&path)
}
