// Unit definitions. A definition is immutable once built; every accessor that
// a derived type may leave unset resolves through the ancestor chain.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::entry::{EntryPoint, EntryPointDescriptor, HttpMethod};
use super::error::DefinitionError;
use super::routes::RouteTable;
use super::template::DeploymentTemplate;
use crate::instance::Context;

pub const BASE_IMAGE: &str = "photon/runtime:0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HANDLER_MAX_CONCURRENCY: usize = 1;
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(600);

pub type InitFn = Arc<dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync>;

/// Where the source snapshot of a unit comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    File(PathBuf),
    Text { name: String, text: String },
}

/// A file or directory copied into the artifact under `files/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraFile {
    pub archive_path: String,
    pub source: PathBuf,
}

pub struct UnitDefinition {
    type_name: String,
    parent: Option<Arc<UnitDefinition>>,
    doc: Option<String>,
    declared: Vec<Arc<EntryPointDescriptor>>,
    requirement_dependency: Vec<String>,
    system_dependency: Vec<String>,
    deployment_template: Option<DeploymentTemplate>,
    image: Option<String>,
    args: Option<Vec<String>>,
    cmd: Option<Vec<String>>,
    exposed_port: Option<u16>,
    liveness_port: Option<u16>,
    timeout_graceful_shutdown: Option<Duration>,
    incoming_traffic_grace_period: Option<Duration>,
    handler_max_concurrency: Option<usize>,
    handler_timeout: Option<Duration>,
    vcs_url: Option<String>,
    init: Option<InitFn>,
    source: Option<SourceRef>,
    extra_files: Option<Vec<ExtraFile>>,
    routes: Arc<RouteTable>,
}

impl fmt::Debug for UnitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefinition")
            .field("type_name", &self.type_name)
            .field("parent", &self.parent.as_ref().map(|p| p.type_name.as_str()))
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl UnitDefinition {
    pub fn builder(type_name: impl Into<String>) -> UnitDefinitionBuilder {
        UnitDefinitionBuilder::new(type_name.into())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<&Arc<UnitDefinition>> {
        self.parent.as_ref()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Ancestor chain, root first, ending with `self`.
    pub fn ancestors(&self) -> Vec<&UnitDefinition> {
        let mut chain = vec![self];
        let mut cur = self.parent.as_deref();
        while let Some(def) = cur {
            chain.push(def);
            cur = def.parent.as_deref();
        }
        chain.reverse();
        chain
    }

    pub fn is_a(&self, type_name: &str) -> bool {
        self.ancestors().iter().any(|d| d.type_name == type_name)
    }

    /// Entry points declared by this type alone.
    pub fn declared(&self) -> &[Arc<EntryPointDescriptor>] {
        &self.declared
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    fn inherited<T>(&self, pick: impl Fn(&UnitDefinition) -> Option<T>) -> Option<T> {
        let mut cur = Some(self);
        while let Some(def) = cur {
            if let Some(v) = pick(def) {
                return Some(v);
            }
            cur = def.parent.as_deref();
        }
        None
    }

    /// Requirement dependencies of the whole chain, root first.
    pub fn requirement_dependency(&self) -> Vec<String> {
        self.ancestors()
            .iter()
            .flat_map(|d| d.requirement_dependency.iter().cloned())
            .collect()
    }

    /// System dependencies of the whole chain, root first, deduplicated.
    pub fn system_dependency(&self) -> Vec<String> {
        merge_unique(self.ancestors().iter().map(|d| d.system_dependency.as_slice()))
    }

    pub fn deployment_template(&self) -> DeploymentTemplate {
        self.inherited(|d| d.deployment_template.clone()).unwrap_or_default()
    }

    pub fn image(&self) -> String {
        self.inherited(|d| d.image.clone())
            .unwrap_or_else(|| BASE_IMAGE.to_string())
    }

    pub fn args(&self) -> Vec<String> {
        self.inherited(|d| d.args.clone()).unwrap_or_default()
    }

    pub fn cmd(&self) -> Option<Vec<String>> {
        self.inherited(|d| d.cmd.clone())
    }

    pub fn exposed_port(&self) -> u16 {
        self.declared_port().unwrap_or(DEFAULT_PORT)
    }

    pub fn declared_port(&self) -> Option<u16> {
        self.inherited(|d| d.exposed_port)
    }

    /// Dedicated liveness port, if the unit declares one.
    pub fn health_check_liveness_tcp_port(&self) -> Option<u16> {
        self.inherited(|d| d.liveness_port)
    }

    pub fn timeout_graceful_shutdown(&self) -> Option<Duration> {
        self.inherited(|d| d.timeout_graceful_shutdown)
    }

    pub fn incoming_traffic_grace_period(&self) -> Option<Duration> {
        self.inherited(|d| d.incoming_traffic_grace_period)
    }

    pub fn handler_max_concurrency(&self) -> usize {
        self.inherited(|d| d.handler_max_concurrency)
            .unwrap_or(DEFAULT_HANDLER_MAX_CONCURRENCY)
    }

    pub fn handler_timeout(&self) -> Duration {
        self.inherited(|d| d.handler_timeout)
            .unwrap_or(DEFAULT_HANDLER_TIMEOUT)
    }

    pub fn vcs_url(&self) -> Option<String> {
        self.inherited(|d| d.vcs_url.clone())
    }

    /// Initializer of the nearest type that declares one.
    pub fn init_fn(&self) -> Option<InitFn> {
        self.inherited(|d| d.init.clone())
    }

    /// Source of this exact type; ancestors' sources are not used.
    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn extra_files(&self) -> Vec<ExtraFile> {
        self.inherited(|d| d.extra_files.clone()).unwrap_or_default()
    }
}

fn merge_unique<'a>(lists: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in lists.flatten() {
        if seen.insert(item.as_str()) {
            out.push(item.clone());
        }
    }
    out
}

/// `path` as archive member components joined by `/`, with `.` dropped.
/// None for absolute, parent-relative or empty paths.
fn archive_relative(path: &str) -> Option<String> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[must_use]
pub struct UnitDefinitionBuilder {
    type_name: String,
    parent: Option<Arc<UnitDefinition>>,
    doc: Option<String>,
    entry_points: Vec<EntryPoint>,
    requirement_dependency: Vec<String>,
    system_dependency: Vec<String>,
    deployment_template: Option<DeploymentTemplate>,
    image: Option<String>,
    args: Option<Vec<String>>,
    cmd: Option<Vec<String>>,
    exposed_port: Option<u16>,
    liveness_port: Option<u16>,
    timeout_graceful_shutdown: Option<Duration>,
    incoming_traffic_grace_period: Option<Duration>,
    handler_max_concurrency: Option<usize>,
    handler_timeout: Option<Duration>,
    vcs_url: Option<String>,
    init: Option<InitFn>,
    source: Option<SourceRef>,
    extra_files: Option<Vec<ExtraFile>>,
}

impl UnitDefinitionBuilder {
    fn new(type_name: String) -> Self {
        Self {
            type_name,
            parent: None,
            doc: None,
            entry_points: Vec::new(),
            requirement_dependency: Vec::new(),
            system_dependency: Vec::new(),
            deployment_template: None,
            image: None,
            args: None,
            cmd: None,
            exposed_port: None,
            liveness_port: None,
            timeout_graceful_shutdown: None,
            incoming_traffic_grace_period: None,
            handler_max_concurrency: None,
            handler_timeout: None,
            vcs_url: None,
            init: None,
            source: None,
            extra_files: None,
        }
    }

    pub fn extends(mut self, parent: &Arc<UnitDefinition>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_points.push(entry_point);
        self
    }

    pub fn requirement_dependency<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirement_dependency.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn system_dependency<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_dependency.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn deployment_template(mut self, template: DeploymentTemplate) -> Self {
        self.deployment_template = Some(template);
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(Into::into).collect());
        self
    }

    pub fn exposed_port(mut self, port: u16) -> Self {
        self.exposed_port = Some(port);
        self
    }

    pub fn health_check_liveness_tcp_port(mut self, port: u16) -> Self {
        self.liveness_port = Some(port);
        self
    }

    pub fn timeout_graceful_shutdown(mut self, timeout: Duration) -> Self {
        self.timeout_graceful_shutdown = Some(timeout);
        self
    }

    pub fn incoming_traffic_grace_period(mut self, period: Duration) -> Self {
        self.incoming_traffic_grace_period = Some(period);
        self
    }

    pub fn handler_max_concurrency(mut self, n: usize) -> Self {
        self.handler_max_concurrency = Some(n);
        self
    }

    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    pub fn vcs_url(mut self, url: impl Into<String>) -> Self {
        self.vcs_url = Some(url.into());
        self
    }

    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
        self
    }

    pub fn source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(SourceRef::File(path.into()));
        self
    }

    pub fn source_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.source = Some(SourceRef::Text {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    /// Ships `source` (file or directory) inside the artifact at
    /// `files/<archive_path>`.
    pub fn extra_file(mut self, archive_path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        self.extra_files.get_or_insert_with(Vec::new).push(ExtraFile {
            archive_path: archive_path.into(),
            source: source.into(),
        });
        self
    }

    pub fn build(mut self) -> Result<Arc<UnitDefinition>, DefinitionError> {
        let unit = self.type_name.clone();

        if self.handler_max_concurrency == Some(0) {
            return Err(DefinitionError::ZeroConcurrency { unit });
        }
        if let Some(template) = &self.deployment_template {
            template.validate(&unit)?;
        }
        for extra in self.extra_files.iter_mut().flatten() {
            extra.archive_path =
                archive_relative(&extra.archive_path).ok_or_else(|| DefinitionError::InvalidExtraFile {
                    path: extra.archive_path.clone(),
                })?;
        }

        let mut declared = Vec::with_capacity(self.entry_points.len());
        let mut routes: BTreeSet<(String, HttpMethod)> = BTreeSet::new();
        let mut mounts: BTreeSet<String> = BTreeSet::new();
        for ep in self.entry_points {
            let desc = ep.into_descriptor(&unit)?;
            if desc.mount {
                if routes.iter().any(|(p, _)| *p == desc.path) {
                    return Err(DefinitionError::MountConflict { unit, path: desc.path });
                }
                if !mounts.insert(desc.path.clone()) {
                    return Err(DefinitionError::DuplicateMount { unit, path: desc.path });
                }
            } else {
                if mounts.contains(&desc.path) {
                    return Err(DefinitionError::MountConflict { unit, path: desc.path });
                }
                for method in &desc.methods {
                    if !routes.insert((desc.path.clone(), *method)) {
                        return Err(DefinitionError::DuplicateRoute {
                            unit,
                            path: desc.path.clone(),
                            method: *method,
                        });
                    }
                }
            }
            declared.push(Arc::new(desc));
        }

        let chain = self.parent.as_ref().map(|p| p.ancestors()).unwrap_or_default();
        let layers = chain
            .iter()
            .map(|d| (d.type_name.as_str(), d.declared.as_slice()))
            .chain(std::iter::once((unit.as_str(), declared.as_slice())));
        let table = RouteTable::fold(layers);

        debug!(
            component = "registry",
            event = "unit_defined",
            unit = unit.as_str(),
            depth = chain.len(),
            routes = table.len(),
            "unit defined"
        );

        Ok(Arc::new(UnitDefinition {
            type_name: self.type_name,
            parent: self.parent,
            doc: self.doc,
            declared,
            requirement_dependency: self.requirement_dependency,
            system_dependency: self.system_dependency,
            deployment_template: self.deployment_template,
            image: self.image,
            args: self.args,
            cmd: self.cmd,
            exposed_port: self.exposed_port,
            liveness_port: self.liveness_port,
            timeout_graceful_shutdown: self.timeout_graceful_shutdown,
            incoming_traffic_grace_period: self.incoming_traffic_grace_period,
            handler_max_concurrency: self.handler_max_concurrency,
            handler_timeout: self.handler_timeout,
            vcs_url: self.vcs_url,
            init: self.init,
            source: self.source,
            extra_files: self.extra_files,
            routes: Arc::new(table),
        }))
    }
}
