// Unit registry: entry-point declarations, unit definitions and the route
// table folded from their ancestor chain.

pub mod definition;
pub mod entry;
pub mod error;
pub mod routes;
pub mod template;

#[cfg(test)]
mod definition_test;

pub use definition::{ExtraFile, InitFn, SourceRef, UnitDefinition, UnitDefinitionBuilder};
pub use entry::{
    Args, EntryPoint, EntryPointDescriptor, Handler, HandlerError, HttpMethod, Mounted,
    RawRequest, RawResponse, Reply,
};
pub use error::DefinitionError;
pub use routes::RouteTable;
pub use template::{DeploymentTemplate, TemplateReport, ENV_VAR_REQUIRED};
