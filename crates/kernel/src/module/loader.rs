//! Module loader facade.
//!
//! Composes the registry, condition validator, dependency resolver, level
//! builder, and lifecycle manager into the four supported activation paths:
//! eager sequential (init), best-effort concurrent by level (normal),
//! on-demand (lazy), and route-triggered lazy activation.
//!
//! Partial failure inside a concurrent level is isolated: every outcome in
//! the level is collected, failing modules are marked failed and logged, and
//! their siblings plus later levels proceed.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use tracing::{debug, info, warn};

use crate::access::ConditionValidator;
use crate::config::RuntimeConfig;
use crate::context::BootstrapContext;
use crate::error::LoaderError;

use super::dependency::{DependencyResolver, LoadOne};
use super::levels::build_load_levels;
use super::lifecycle::{LazyTrigger, LifecycleManager};
use super::registry::ModuleRegistry;
use super::status::{LoadStatus, StatusTracker};
use super::{LoadType, ModuleDescriptor};

/// Orchestrates staged module activation. Cheap to clone; all clones share
/// one registry and status tracker.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    registry: Arc<ModuleRegistry>,
    status: Arc<StatusTracker>,
    validator: ConditionValidator,
    resolver: DependencyResolver,
    lifecycle: LifecycleManager,
    ctx: Arc<BootstrapContext>,
}

impl ModuleLoader {
    /// Create a loader bound to the shared bootstrap context.
    pub fn new(ctx: Arc<BootstrapContext>, config: &RuntimeConfig) -> Self {
        let registry = Arc::new(ModuleRegistry::new());
        let status = Arc::new(StatusTracker::new());
        Self {
            inner: Arc::new(LoaderInner {
                validator: ConditionValidator::new(status.clone()),
                resolver: DependencyResolver::new(registry.clone(), status.clone()),
                lifecycle: LifecycleManager::new(registry.clone(), status.clone(), config),
                registry,
                status,
                ctx,
            }),
        }
    }

    /// Register a module descriptor.
    pub fn add_module(&self, module: ModuleDescriptor) -> Result<(), LoaderError> {
        self.inner.registry.add(module).map(|_| ())
    }

    /// Register a batch of module descriptors. Stops at the first rejection.
    pub fn add_modules(
        &self,
        modules: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> Result<(), LoaderError> {
        for module in modules {
            self.add_module(module)?;
        }
        Ok(())
    }

    /// Activate all init modules strictly sequentially, ascending by
    /// priority, then seal the registry.
    ///
    /// Each module must settle (success or failure) before the next starts.
    /// A failure propagates immediately and halts the remaining init
    /// modules; the registry stays open in that case since the init phase
    /// did not complete.
    pub async fn init_init_modules(&self) -> Result<(), LoaderError> {
        let modules =
            ModuleRegistry::sort_by_priority(self.inner.registry.by_type(LoadType::Init));
        info!(count = modules.len(), "activating init modules");

        for module in modules {
            self.inner.load_module(module).await?;
        }

        self.inner.registry.seal();
        Ok(())
    }

    /// Make every navigable route known to the router before first paint,
    /// without paying for full module initialization.
    ///
    /// For each non-init module not yet loaded: lazy modules are checked
    /// against their flag/permission gates and their lazy dependencies are
    /// pre-registered first; then routes and locale bundles are wired, with
    /// the init hook skipped. A module that fails to preload (e.g. its
    /// remote config is unreachable) is logged and skipped; on-demand
    /// activation may retry it later.
    pub async fn preload_routes(&self) -> Result<(), LoaderError> {
        let mut visited = HashSet::new();
        for module in self.inner.registry.all() {
            if module.load_type() == LoadType::Init {
                continue;
            }
            if self.inner.status.is_loaded(module.name()) {
                continue;
            }
            if let Err(e) = self.inner.preload_module(&module, &mut visited).await {
                warn!(
                    module = module.name(),
                    error = %e,
                    "route preload failed, module skipped"
                );
            }
        }
        Ok(())
    }

    /// Activate all pending normal modules, grouped into dependency levels:
    /// levels run strictly sequentially, modules within a level are
    /// dispatched concurrently.
    ///
    /// Requires the init phase to be complete. Dependency-graph errors
    /// (cycles) abort level construction; per-module failures inside a level
    /// are isolated and recorded.
    pub async fn load_normal_modules(&self) -> Result<(), LoaderError> {
        if !self.inner.registry.is_sealed() {
            return Err(LoaderError::InitPhaseIncomplete);
        }

        let candidates: Vec<_> = self
            .inner
            .registry
            .by_type(LoadType::Normal)
            .into_iter()
            .filter(|m| {
                !self.inner.status.is_loaded(m.name()) && !self.inner.status.is_loading(m.name())
            })
            .collect();
        let levels = build_load_levels(&candidates, &self.inner.status)?;
        info!(
            modules = candidates.len(),
            levels = levels.len(),
            "activating normal modules by level"
        );

        for (index, level) in levels.into_iter().enumerate() {
            let activations = level.into_iter().map(|module| {
                let inner = self.inner.clone();
                async move {
                    let name = module.name().to_string();
                    (name, inner.load_module(module).await)
                }
            });

            for (name, result) in join_all(activations).await {
                if let Err(e) = result {
                    warn!(
                        module = %name,
                        level = index,
                        error = %e,
                        "module failed within level, siblings unaffected"
                    );
                }
            }
        }
        Ok(())
    }

    /// Activate a single module on demand, loading its dependency chain
    /// first (sequentially, ascending by priority).
    ///
    /// A module already loaded or loading is a silent no-op. Unmet gating
    /// conditions are recorded as a failed status, not returned as an error;
    /// init-hook failures are returned to the caller.
    pub async fn load_lazy_module(&self, name: &str) -> Result<(), LoaderError> {
        self.inner.load_lazy(name).await
    }

    /// Resolve the module owning `route_name` (exact index entry, then
    /// first-segment fallback) and activate it. Routes owned by no module
    /// are ignored with a debug log, since the router also serves
    /// kernel-owned routes.
    pub async fn auto_load_module_by_route(&self, route_name: &str) -> Result<(), LoaderError> {
        match self.inner.registry.by_route_name(route_name) {
            Some(module) => self.inner.load_lazy(module.name()).await,
            None => {
                debug!(route = route_name, "no module owns route, ignoring");
                Ok(())
            }
        }
    }

    /// Whether the named module has finished loading.
    pub fn is_module_loaded(&self, name: &str) -> bool {
        self.inner.status.is_loaded(name)
    }

    /// Current activation status of the named module.
    pub fn module_status(&self, name: &str) -> LoadStatus {
        self.inner.status.status_of(name)
    }

    /// Terminal error of the named module, if it failed.
    pub fn module_error(&self, name: &str) -> Option<String> {
        self.inner.status.error_of(name)
    }

    /// Look up a registered module descriptor.
    pub fn get_module(&self, name: &str) -> Option<Arc<ModuleDescriptor>> {
        self.inner.registry.get(name)
    }

    /// All registered modules of the given load type.
    pub fn modules_by_type(&self, load_type: LoadType) -> Vec<Arc<ModuleDescriptor>> {
        self.inner.registry.by_type(load_type)
    }

    /// The underlying registry, for diagnostics.
    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }
}

impl LoaderInner {
    /// Activate one module: gate check, status transitions, lifecycle side
    /// effects, init hook.
    ///
    /// Unmet conditions are recorded as `Failed` and reported as success
    /// (an expected outcome); real activation errors are recorded and
    /// returned.
    fn load_module(
        self: &Arc<Self>,
        module: Arc<ModuleDescriptor>,
    ) -> BoxFuture<'static, Result<(), LoaderError>> {
        let inner = self.clone();
        Box::pin(async move {
            let name = module.name().to_string();
            // Failed is terminal under the monotonic-transition rule, so a
            // re-entry could never be observed through the status tracker.
            if inner.status.status_of(&name) != LoadStatus::Pending {
                debug!(module = %name, status = %inner.status.status_of(&name), "activation skipped");
                return Ok(());
            }

            if let Err(unmet) = inner.validator.check_load_conditions(&module, &inner.ctx).await
            {
                inner.status.mark_failed(&name, unmet.to_string());
                warn!(module = %name, reason = %unmet, "load conditions unmet");
                return Ok(());
            }

            inner.status.mark_loading(&name);
            match inner.activate(&module).await {
                Ok(()) => {
                    inner.status.mark_loaded(&name);
                    info!(module = %name, "module loaded");
                    Ok(())
                }
                Err(e) => {
                    inner.status.mark_failed(&name, e.to_string());
                    Err(e)
                }
            }
        })
    }

    async fn activate(self: &Arc<Self>, module: &Arc<ModuleDescriptor>) -> Result<(), LoaderError> {
        let trigger = self.lazy_trigger();
        self.lifecycle
            .register_routes(module, &self.ctx, Some(&trigger))
            .await?;
        self.lifecycle
            .register_localization(module, &self.ctx)
            .await?;
        self.lifecycle.initialize_module(module, &self.ctx).await
    }

    async fn load_lazy(self: &Arc<Self>, name: &str) -> Result<(), LoaderError> {
        let module = self
            .registry
            .get(name)
            .ok_or_else(|| LoaderError::UnknownModule {
                name: name.to_string(),
            })?;
        if self.status.is_loaded(name) || self.status.is_loading(name) {
            return Ok(());
        }

        let load_one = self.load_one();
        let mut visiting = Vec::new();
        self.resolver
            .load_dependencies(&module, &mut visiting, &load_one)
            .await?;
        self.load_module(module).await
    }

    /// Route and locale wiring only, init hooks skipped. For lazy modules,
    /// flag/permission gates are honored and lazy dependencies are
    /// pre-registered first so that their routes exist before the dependent
    /// module's routes can trigger them.
    fn preload_module<'a>(
        self: &'a Arc<Self>,
        module: &'a Arc<ModuleDescriptor>,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<(), LoaderError>> {
        Box::pin(async move {
            if !visited.insert(module.name().to_string()) {
                return Ok(());
            }

            if module.load_type() == LoadType::Lazy {
                if let Some(condition) = module.condition() {
                    let flags_ok = self
                        .validator
                        .check_feature_flags(&condition.feature_flags, &self.ctx)
                        .await;
                    let perms_ok = self
                        .validator
                        .check_permissions(&condition.access_permissions, &self.ctx)
                        .await;
                    if !flags_ok || !perms_ok {
                        debug!(
                            module = module.name(),
                            "gates unmet, routes not preloaded"
                        );
                        return Ok(());
                    }
                }

                for dep_name in module.dependency_names() {
                    let Some(dep) = self.registry.get(dep_name) else {
                        return Err(LoaderError::missing_dependency(
                            module.name(),
                            &[dep_name.clone()],
                        ));
                    };
                    if dep.load_type() == LoadType::Lazy && !self.status.is_loaded(dep_name) {
                        self.preload_module(&dep, visited).await?;
                    }
                }
            }

            let trigger = self.lazy_trigger();
            self.lifecycle
                .register_routes(module, &self.ctx, Some(&trigger))
                .await?;
            self.lifecycle.register_localization(module, &self.ctx).await
        })
    }

    /// The "load one module" callback handed to the dependency resolver.
    fn load_one(self: &Arc<Self>) -> LoadOne {
        let inner = self.clone();
        Arc::new(move |module| inner.load_module(module))
    }

    /// The trigger wired into lazy routes: first navigation activates the
    /// owning module, with failures logged rather than surfaced to the
    /// router.
    fn lazy_trigger(self: &Arc<Self>) -> LazyTrigger {
        let inner = self.clone();
        Arc::new(move |name: String| {
            let inner = inner.clone();
            Box::pin(async move {
                if let Err(e) = inner.load_lazy(&name).await {
                    warn!(module = %name, error = %e, "lazy route activation failed");
                }
            })
        })
    }
}
