// Router-wide middlewares, listed outermost first in `app::server`.

pub mod auth_middleware;
pub mod cors_middleware;
pub mod metrics_middleware;
pub mod middleware;
pub mod trace_middleware;

pub use auth_middleware::AuthMiddleware;
pub use cors_middleware::CorsMiddleware;
pub use metrics_middleware::MetricsMiddleware;
pub use middleware::Middleware;
pub use trace_middleware::TraceMiddleware;
