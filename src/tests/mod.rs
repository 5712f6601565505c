//! End-to-end tests for the serving assembly.
//!
//! Each case hosts a small unit behind the full application stack and talks
//! to it over a real socket or through the router in-process.

mod cases_dispatch_test;
mod cases_lifecycle_test;

pub mod support;
