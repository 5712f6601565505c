// A hosted unit instance: definition, state, captured values, the once-only
// initializer and the permit pool that governs its blocking entry points.

pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod state;

#[cfg(test)]
mod state_test;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::info;

use crate::governor::{InitError, InitOnce, InitState, PermitPool};
use crate::liveness;
use crate::unit::{
    EntryPointDescriptor, Handler, HandlerError, Mounted, RouteTable, TemplateReport, UnitDefinition,
};

pub use catalog::Catalog;
pub use context::Context;
pub use dispatch::{DispatchError, Input};
pub use state::{Captured, Opaque, StateError, StateGraph};

/// Captured values per entry-point scope.
pub type Captures = BTreeMap<String, BTreeMap<String, Captured>>;

pub struct HostedInstance {
    name: String,
    model: String,
    definition: Arc<UnitDefinition>,
    state: StateGraph,
    captures: RwLock<Captures>,
    init: InitOnce,
    permits: PermitPool,
    catalog: Arc<Catalog>,
}

impl fmt::Debug for HostedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedInstance")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("unit", &self.definition.type_name())
            .field("init", &self.init.state())
            .finish_non_exhaustive()
    }
}

#[must_use]
pub struct InstanceBuilder {
    definition: Arc<UnitDefinition>,
    name: Option<String>,
    model: Option<String>,
    catalog: Option<Arc<Catalog>>,
    state: BTreeMap<String, Captured>,
    captures: Option<Captures>,
    initialized: bool,
}

impl InstanceBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub(crate) fn restored(mut self, state: BTreeMap<String, Captured>, captures: Captures, initialized: bool) -> Self {
        self.state = state;
        self.captures = Some(captures);
        self.initialized = initialized;
        self
    }

    pub fn build(self) -> Arc<HostedInstance> {
        let definition = self.definition;
        let name = self
            .name
            .unwrap_or_else(|| definition.type_name().to_lowercase());
        let model = self
            .model
            .unwrap_or_else(|| format!("unit:{}", definition.type_name()));
        let captures = self.captures.unwrap_or_else(|| declared_captures(definition.routes()));
        let init = if self.initialized {
            InitOnce::completed(name.clone())
        } else {
            InitOnce::new(name.clone())
        };
        let catalog = self.catalog.unwrap_or_else(|| {
            let catalog = Catalog::new();
            catalog.register(Arc::clone(&definition));
            Arc::new(catalog)
        });

        Arc::new(HostedInstance {
            permits: PermitPool::new(definition.handler_max_concurrency()),
            state: StateGraph::from_slots(self.state),
            captures: RwLock::new(captures),
            name,
            model,
            definition,
            init,
            catalog,
        })
    }
}

fn declared_captures(table: &RouteTable) -> Captures {
    table
        .descriptors()
        .iter()
        .filter(|d| !d.captures.is_empty())
        .map(|d| (d.scope(), d.captures.clone()))
        .collect()
}

impl HostedInstance {
    pub fn builder(definition: Arc<UnitDefinition>) -> InstanceBuilder {
        InstanceBuilder {
            definition,
            name: None,
            model: None,
            catalog: None,
            state: BTreeMap::new(),
            captures: None,
            initialized: false,
        }
    }

    pub fn new(definition: Arc<UnitDefinition>) -> Arc<Self> {
        Self::builder(definition).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn definition(&self) -> &UnitDefinition {
        &self.definition
    }

    pub fn definition_arc(&self) -> &Arc<UnitDefinition> {
        &self.definition
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        self.definition.routes()
    }

    pub fn state(&self) -> &StateGraph {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_arc(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn permits(&self) -> &PermitPool {
        &self.permits
    }

    pub fn init_state(&self) -> InitState {
        self.init.state()
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_done()
    }

    pub fn captured(&self, scope: &str, name: &str) -> Option<Captured> {
        self.captures.read().get(scope)?.get(name).cloned()
    }

    pub fn captures(&self) -> Captures {
        self.captures.read().clone()
    }

    /// Interface document of this instance's routes.
    pub fn openapi_document(&self) -> serde_json::Value {
        crate::schema::openapi::document(
            &self.name,
            self.definition.doc(),
            env!("CARGO_PKG_VERSION"),
            self.definition.routes(),
        )
    }

    pub fn context(self: &Arc<Self>) -> Context {
        Context::new(Arc::clone(self), None)
    }

    /// Applies the unit's deployment template to the process environment.
    pub fn apply_deployment_template(&self) -> TemplateReport {
        self.definition
            .deployment_template()
            .apply(self.definition.type_name())
    }

    /// Runs template application and the user initializer exactly once. The
    /// run lives in its own task so a caller that goes away cannot abandon it
    /// half way.
    pub async fn ensure_initialized(self: &Arc<Self>) -> Result<(), InitError> {
        if self.init.is_done() {
            return Ok(());
        }
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let runner = Arc::clone(&this);
            this.init
                .call_once(move || async move {
                    tokio::task::spawn_blocking(move || runner.run_initializer())
                        .await
                        .map_err(|e| anyhow::anyhow!("initializer panicked: {e}"))?
                })
                .await
        });
        task.await.map_err(|e| InitError::Failed {
            unit: self.name.clone(),
            reason: format!("initializer task aborted: {e}"),
        })?
    }

    fn run_initializer(self: &Arc<Self>) -> anyhow::Result<()> {
        let report = self.apply_deployment_template();
        if let Some(init) = self.definition.init_fn() {
            init(&self.context())?;
        }
        info!(
            component = "init",
            event = "initializer_ran",
            unit = self.name.as_str(),
            env_defaulted = report.defaulted.len(),
            env_missing = report.missing_env.len(),
            secrets_missing = report.missing_secrets.len(),
            "initializer completed"
        );
        Ok(())
    }

    /// Produces the application behind a mount entry point.
    pub fn mount(self: &Arc<Self>, desc: &EntryPointDescriptor) -> Result<Mounted, DispatchError> {
        match &desc.handler {
            Handler::Mount(f) => {
                let ctx = Context::new(Arc::clone(self), Some(desc.scope()));
                f(&ctx).map_err(DispatchError::from)
            }
            _ => Err(DispatchError::Handler(HandlerError::Internal(anyhow::anyhow!(
                "`{}` is not a mount",
                desc.name
            )))),
        }
    }
}

impl liveness::Service for HostedInstance {
    fn is_alive(&self, _timeout: Duration) -> bool {
        self.init.state() != InitState::Failed
    }
}
