use std::time::Duration;

// Metric name constants
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUESTS_IN_PROGRESS: &str = "http_requests_inprogress";
pub const DISPATCH_ERRORS_TOTAL: &str = "photon_dispatch_errors_total";
pub const PERMITS_IN_USE: &str = "photon_permits_in_use";

/// Response extension set by a unit's catch-all: the route of the default
/// entry point that served a path the router did not match itself.
#[derive(Debug, Clone)]
pub struct FallbackRoute(pub String);

/// Latency histogram buckets, in seconds.
pub const LATENCY_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0];

/// Records one finished request.
pub fn record_request(handler: &str, method: &str, status: u16, elapsed: Duration) {
    metrics::histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "handler" => handler.to_string(),
        "method" => method.to_string()
    )
    .record(elapsed.as_secs_f64());
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "handler" => handler.to_string(),
        "method" => method.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
}

pub fn inc_in_progress(handler: &str, method: &str) {
    metrics::gauge!(
        HTTP_REQUESTS_IN_PROGRESS,
        "handler" => handler.to_string(),
        "method" => method.to_string()
    )
    .increment(1.0);
}

pub fn dec_in_progress(handler: &str, method: &str) {
    metrics::gauge!(
        HTTP_REQUESTS_IN_PROGRESS,
        "handler" => handler.to_string(),
        "method" => method.to_string()
    )
    .decrement(1.0);
}

/// Counts a failed dispatch by unit and HTTP status.
pub fn add_dispatch_error(unit: &str, status: u16) {
    metrics::counter!(
        DISPATCH_ERRORS_TOTAL,
        "unit" => unit.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn set_permits_in_use(unit: &str, in_use: usize) {
    metrics::gauge!(PERMITS_IN_USE, "unit" => unit.to_string()).set(in_use as f64);
}

/// `200` -> `2xx`.
pub fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}
