//! Module registry: the set of known module descriptors plus the derived
//! route-to-module index.
//!
//! The registry is open during the registration phase and sealed once the
//! init phase has completed loading; later additions are rejected. Route
//! index entries appear as each module's routes become known, which for lazy
//! modules may be only after their deferred config resolves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::LoaderError;
use crate::route::{first_segment, Route};

use super::{LoadType, ModuleDescriptor};

#[derive(Default)]
struct RegistryInner {
    modules: HashMap<String, Arc<ModuleDescriptor>>,
    /// Registration order, for stable priority ties.
    order: Vec<String>,
    /// Full route name and first dot-segment -> owning module.
    route_index: HashMap<String, String>,
    sealed: bool,
}

/// Owns the known module descriptors and the route-to-module index.
#[derive(Default)]
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
}

impl ModuleRegistry {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module descriptor.
    ///
    /// Fails with `DuplicateModule` if the name exists, `RegistryClosed`
    /// after the init phase, or `InitConditionRejected` for an init module
    /// carrying a load condition. A rejected attempt leaves the registry
    /// untouched. Routes of already-resolved configs are indexed eagerly.
    pub fn add(&self, module: ModuleDescriptor) -> Result<Arc<ModuleDescriptor>, LoaderError> {
        if module.load_type() == LoadType::Init
            && module.condition().is_some_and(|c| !c.is_empty())
        {
            return Err(LoaderError::InitConditionRejected {
                name: module.name().to_string(),
            });
        }

        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(LoaderError::RegistryClosed {
                name: module.name().to_string(),
            });
        }
        if inner.modules.contains_key(module.name()) {
            return Err(LoaderError::DuplicateModule {
                name: module.name().to_string(),
            });
        }

        let name = module.name().to_string();
        let module = Arc::new(module);
        inner.order.push(name.clone());

        if let Some(config) = module.config().get() {
            let routes = config.routes();
            index_routes_inner(&mut inner.route_index, &name, &routes);
        }
        inner.modules.insert(name.clone(), module.clone());
        debug!(module = %name, load_type = %module.load_type(), "module registered");
        Ok(module)
    }

    /// Close the registry to new additions. Called once the init phase has
    /// completed loading.
    pub fn seal(&self) {
        self.inner.write().sealed = true;
        debug!("module registry sealed");
    }

    /// Whether the registry is closed to new additions.
    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }

    /// Look up a module by name.
    pub fn get(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.inner.read().modules.get(name).cloned()
    }

    /// Whether a module with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().modules.contains_key(name)
    }

    /// All modules of the given load type, in registration order.
    pub fn by_type(&self, load_type: LoadType) -> Vec<Arc<ModuleDescriptor>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.modules.get(name))
            .filter(|m| m.load_type() == load_type)
            .cloned()
            .collect()
    }

    /// All registered modules, in registration order.
    pub fn all(&self) -> Vec<Arc<ModuleDescriptor>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.modules.get(name))
            .cloned()
            .collect()
    }

    /// Resolve the module owning a route name: exact index entry first, then
    /// the route name's first dot-segment.
    pub fn by_route_name(&self, route_name: &str) -> Option<Arc<ModuleDescriptor>> {
        let inner = self.inner.read();
        let owner = inner
            .route_index
            .get(route_name)
            .or_else(|| inner.route_index.get(first_segment(route_name)))?;
        inner.modules.get(owner).cloned()
    }

    /// Index a module's routes once they become known.
    pub fn index_routes(&self, module: &str, routes: &[Route]) {
        let mut inner = self.inner.write();
        index_routes_inner(&mut inner.route_index, module, routes);
    }

    /// Number of indexed route names.
    pub fn route_count(&self) -> usize {
        self.inner.read().route_index.len()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    /// Whether the registry holds no modules.
    pub fn is_empty(&self) -> bool {
        self.inner.read().modules.is_empty()
    }

    /// Stable ascending sort by load priority; ties keep their existing
    /// (registration) order.
    pub fn sort_by_priority(
        mut modules: Vec<Arc<ModuleDescriptor>>,
    ) -> Vec<Arc<ModuleDescriptor>> {
        modules.sort_by_key(|m| m.load_priority());
        modules
    }
}

fn index_routes_inner(index: &mut HashMap<String, String>, module: &str, routes: &[Route]) {
    for route in routes {
        index.insert(route.name.clone(), module.to_string());
        // first-segment fallback entry, kept from whichever module indexed
        // it first
        index
            .entry(first_segment(&route.name).to_string())
            .or_insert_with(|| module.to_string());
    }
}
