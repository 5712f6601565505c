//! Prometheus metrics of the serving layer.
//
//! Metric names and recording helpers live in `meter`; the exporter and the
//! `/metrics` route live in `controller::metrics`.

pub mod meter;

pub use meter::*;
