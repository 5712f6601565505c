// HTTP controllers: system endpoints and the hosted unit's entry points.

pub mod controller;
pub mod dispatch;
pub mod favicon;
pub mod metrics;
pub mod openapi;
pub mod probe;

pub use dispatch::{unit_router, AssemblyError, EntryPointController};
pub use favicon::FaviconController;
pub use metrics::PrometheusMetricsController;
pub use openapi::OpenApiController;
pub use probe::LivenessProbeController;
