// Serving application: one hosted instance behind the HTTP stack.

#[allow(clippy::module_inception)]
pub mod app;
pub mod server;

pub use app::{App, Bound};
pub use server::HttpServer;
