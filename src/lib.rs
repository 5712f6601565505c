#[path = "k8s/probe/liveness/mod.rs"]
pub mod liveness;
#[path = "shared/logfile/mod.rs"]
pub mod logfile;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod governor;
pub mod http;
pub mod instance;
pub mod metrics;
pub mod middleware;
pub mod prebuilt;
pub mod schema;
pub mod shutdown;
pub mod unit;

pub use artifact::{load, save, Artifact, ArtifactMetadata, CodecError};
pub use instance::{Captured, Catalog, Context, HostedInstance, Opaque, StateGraph};
pub use unit::{
    Args, DefinitionError, DeploymentTemplate, EntryPoint, HandlerError, HttpMethod, Mounted,
    RawRequest, RawResponse, Reply, RouteTable, UnitDefinition,
};
