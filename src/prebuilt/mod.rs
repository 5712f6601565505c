// Units shipped with the runtime.

pub mod echo;

use std::sync::Arc;

use crate::instance::Catalog;
use crate::unit::DefinitionError;

pub use echo::echo;

/// Catalog holding every prebuilt unit.
pub fn catalog() -> Result<Arc<Catalog>, DefinitionError> {
    let catalog = Catalog::new();
    catalog.register(echo()?);
    Ok(Arc::new(catalog))
}
