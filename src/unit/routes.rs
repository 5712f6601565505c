// Route table: the (path, method) to entry-point mapping of a unit, folded
// from its ancestor chain with the most derived declaration winning.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::entry::{normalize_path, EntryPointDescriptor, HttpMethod};

/// One layer of the fold: a unit type and the entry points it declares itself.
pub type Layer<'a> = (&'a str, &'a [Arc<EntryPointDescriptor>]);

#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: BTreeMap<String, BTreeMap<HttpMethod, Arc<EntryPointDescriptor>>>,
    mounts: BTreeMap<String, Arc<EntryPointDescriptor>>,
}

impl RouteTable {
    /// Folds layers given root first. A later layer replaces earlier entries
    /// per (path, method); methods it does not declare stay as inherited. A
    /// mount and a route share the path namespace, so whichever comes later
    /// shadows the other.
    pub fn fold<'a, I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer<'a>>,
    {
        let mut table = RouteTable::default();

        for (unit, declared) in layers {
            for desc in declared {
                if desc.mount {
                    if let Some(shadowed) = table.routes.remove(&desc.path) {
                        debug!(
                            component = "registry",
                            event = "route_shadowed_by_mount",
                            unit = unit,
                            path = desc.path.as_str(),
                            methods = shadowed.len(),
                            "mount replaces inherited routes"
                        );
                    }
                    table.mounts.insert(desc.path.clone(), Arc::clone(desc));
                    continue;
                }

                if table.mounts.remove(&desc.path).is_some() {
                    debug!(
                        component = "registry",
                        event = "mount_shadowed_by_route",
                        unit = unit,
                        path = desc.path.as_str(),
                        "route replaces inherited mount"
                    );
                }
                let slot = table.routes.entry(desc.path.clone()).or_default();
                for method in &desc.methods {
                    if let Some(prev) = slot.insert(*method, Arc::clone(desc)) {
                        debug!(
                            component = "registry",
                            event = "route_overridden",
                            unit = unit,
                            path = desc.path.as_str(),
                            method = method.as_str(),
                            previous = prev.declared_by.as_str(),
                            "entry point overrides inherited declaration"
                        );
                    }
                }
            }
        }

        table
    }

    /// Looks up `path` (normalized) for `method`.
    pub fn find(&self, path: &str, method: HttpMethod) -> Option<&Arc<EntryPointDescriptor>> {
        let path = normalize_path(path)?;
        self.routes.get(&path).and_then(|methods| methods.get(&method))
    }

    pub fn methods(&self, path: &str) -> Option<&BTreeMap<HttpMethod, Arc<EntryPointDescriptor>>> {
        let path = normalize_path(path)?;
        self.routes.get(&path)
    }

    pub fn mount(&self, path: &str) -> Option<&Arc<EntryPointDescriptor>> {
        let path = normalize_path(path)?;
        self.mounts.get(&path)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &BTreeMap<HttpMethod, Arc<EntryPointDescriptor>>)> {
        self.routes.iter().map(|(p, m)| (p.as_str(), m))
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, HttpMethod, &Arc<EntryPointDescriptor>)> {
        self.routes
            .iter()
            .flat_map(|(p, methods)| methods.iter().map(move |(m, d)| (p.as_str(), *m, d)))
    }

    pub fn mounts(&self) -> impl Iterator<Item = (&str, &Arc<EntryPointDescriptor>)> {
        self.mounts.iter().map(|(p, d)| (p.as_str(), d))
    }

    pub fn default_entry(&self) -> Option<&BTreeMap<HttpMethod, Arc<EntryPointDescriptor>>> {
        self.routes.get("/")
    }

    /// Distinct descriptors reachable through the table.
    pub fn descriptors(&self) -> Vec<Arc<EntryPointDescriptor>> {
        let mut out: Vec<Arc<EntryPointDescriptor>> = Vec::new();
        for (_, _, desc) in self.routes() {
            if !out.iter().any(|d| Arc::ptr_eq(d, desc)) {
                out.push(Arc::clone(desc));
            }
        }
        for desc in self.mounts.values() {
            out.push(Arc::clone(desc));
        }
        out
    }

    /// Number of (path, method) routes, mounts excluded.
    pub fn len(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.mounts.is_empty()
    }
}
