// Process-wide registry consulted when an artifact is loaded: unit types by
// name, named bindings, and the tags of opaque state types that can be
// reconstructed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::state::Opaque;
use crate::unit::UnitDefinition;

#[derive(Default)]
pub struct Catalog {
    units: DashMap<String, Arc<UnitDefinition>>,
    bindings: DashMap<String, Arc<dyn Any + Send + Sync>>,
    opaque: DashMap<String, &'static str>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("units", &self.units.len())
            .field("bindings", &self.bindings.len())
            .field("opaque", &self.opaque.len())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` and every ancestor under its type name.
    pub fn register(&self, definition: Arc<UnitDefinition>) {
        let mut cur = Some(definition);
        while let Some(def) = cur {
            cur = def.parent().cloned();
            debug!(
                component = "catalog",
                event = "unit_registered",
                unit = def.type_name(),
                "unit type registered"
            );
            self.units.insert(def.type_name().to_string(), def);
        }
    }

    pub fn unit(&self, type_name: &str) -> Option<Arc<UnitDefinition>> {
        self.units.get(type_name).map(|d| Arc::clone(d.value()))
    }

    pub fn unit_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn bind<T: Any + Send + Sync>(&self, name: impl Into<String>, value: Arc<T>) {
        self.bindings.insert(name.into(), value);
    }

    pub fn binding<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = Arc::clone(self.bindings.get(name)?.value());
        value.downcast::<T>().ok()
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn register_opaque<T: Opaque>(&self) {
        self.opaque.insert(T::TAG.to_string(), std::any::type_name::<T>());
    }

    pub fn has_reconstructor(&self, tag: &str) -> bool {
        self.opaque.contains_key(tag)
    }
}
