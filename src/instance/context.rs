use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::catalog::Catalog;
use super::state::{Captured, StateGraph};
use super::HostedInstance;
use crate::unit::{HandlerError, UnitDefinition};

/// Handle passed to initializers and handlers: the hosting instance plus the
/// capture scope of the entry point being run.
#[derive(Clone)]
pub struct Context {
    instance: Arc<HostedInstance>,
    scope: Option<String>,
}

impl Context {
    pub(crate) fn new(instance: Arc<HostedInstance>, scope: Option<String>) -> Self {
        Self { instance, scope }
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn model(&self) -> &str {
        self.instance.model()
    }

    pub fn unit(&self) -> &UnitDefinition {
        self.instance.definition()
    }

    pub fn state(&self) -> &StateGraph {
        self.instance.state()
    }

    pub fn catalog(&self) -> &Catalog {
        self.instance.catalog()
    }

    pub fn instance(&self) -> &Arc<HostedInstance> {
        &self.instance
    }

    fn lookup(&self, name: &str) -> Result<Captured, HandlerError> {
        let missing = || HandlerError::Internal(anyhow::anyhow!("no captured value `{name}`"));
        let scope = self.scope.as_deref().ok_or_else(missing)?;
        self.instance.captured(scope, name).ok_or_else(missing)
    }

    /// Captured plain value of the running entry point.
    pub fn captured<T: DeserializeOwned>(&self, name: &str) -> Result<T, HandlerError> {
        match self.lookup(name)? {
            Captured::Plain { value } => serde_json::from_value(value)
                .map_err(|e| HandlerError::Internal(anyhow::anyhow!("captured `{name}`: {e}"))),
            other => Err(HandlerError::Internal(anyhow::anyhow!(
                "captured `{name}` is {}, not plain",
                other.kind()
            ))),
        }
    }

    /// Captured binding of the running entry point, resolved in the catalog.
    pub fn captured_binding<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, HandlerError> {
        match self.lookup(name)? {
            Captured::Binding { name: binding } => self
                .catalog()
                .binding::<T>(&binding)
                .ok_or_else(|| HandlerError::Internal(anyhow::anyhow!("binding `{binding}` is not registered"))),
            other => Err(HandlerError::Internal(anyhow::anyhow!(
                "captured `{name}` is {}, not a binding",
                other.kind()
            ))),
        }
    }
}
