//! Recursive dependency loading for the on-demand activation paths.
//!
//! Ensures every prerequisite of a module is loaded before the module
//! itself, detecting cycles along the in-flight recursion path. The actual
//! "load one module" operation is supplied by the facade as a callback, so
//! this component never couples back to it. A single module's dependency
//! chain is always activated sequentially, in ascending priority order;
//! concurrency only exists across independent modules via the level builder.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::error::LoaderError;

use super::{ModuleDescriptor, ModuleRegistry, StatusTracker};

/// Callback that activates a single module, supplied by the facade.
pub type LoadOne =
    Arc<dyn Fn(Arc<ModuleDescriptor>) -> BoxFuture<'static, Result<(), LoaderError>> + Send + Sync>;

/// Resolves and loads a module's prerequisites.
pub struct DependencyResolver {
    registry: Arc<ModuleRegistry>,
    status: Arc<StatusTracker>,
}

impl DependencyResolver {
    /// Create a resolver over the given registry and status tracker.
    pub fn new(registry: Arc<ModuleRegistry>, status: Arc<StatusTracker>) -> Self {
        Self { registry, status }
    }

    /// Map declared dependency names to descriptors, sorted ascending by
    /// priority.
    ///
    /// Every unresolvable name is collected before reporting, so a single
    /// error lists all of them.
    pub fn resolve_dependency_modules(
        &self,
        module: &str,
        dep_names: &[String],
    ) -> Result<Vec<Arc<ModuleDescriptor>>, LoaderError> {
        let mut resolved = Vec::with_capacity(dep_names.len());
        let mut missing = Vec::new();
        for name in dep_names {
            match self.registry.get(name) {
                Some(dep) => resolved.push(dep),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(LoaderError::missing_dependency(module, &missing));
        }
        Ok(ModuleRegistry::sort_by_priority(resolved))
    }

    /// Recursively ensure every dependency of `module` is loaded before
    /// returning.
    ///
    /// `visiting` is the set of in-flight module names on the current
    /// recursion path; encountering a name already on the path is a
    /// circular dependency, reported with the full cycle.
    pub fn load_dependencies<'a>(
        &'a self,
        module: &'a Arc<ModuleDescriptor>,
        visiting: &'a mut Vec<String>,
        load_one: &'a LoadOne,
    ) -> BoxFuture<'a, Result<(), LoaderError>> {
        Box::pin(async move {
            if module.dependency_names().is_empty() {
                return Ok(());
            }
            visiting.push(module.name().to_string());
            let result = self.load_each(module, visiting, load_one).await;
            visiting.pop();
            result
        })
    }

    async fn load_each(
        &self,
        module: &Arc<ModuleDescriptor>,
        visiting: &mut Vec<String>,
        load_one: &LoadOne,
    ) -> Result<(), LoaderError> {
        let deps = self.resolve_dependency_modules(module.name(), module.dependency_names())?;
        for dep in deps {
            if self.status.is_loaded(dep.name()) {
                continue;
            }
            if visiting.iter().any(|n| n == dep.name()) {
                let mut cycle = visiting.clone();
                cycle.push(dep.name().to_string());
                return Err(LoaderError::circular(&cycle));
            }
            debug!(
                module = module.name(),
                dependency = dep.name(),
                "loading dependency"
            );
            self.load_dependencies(&dep, visiting, load_one).await?;
            load_one(dep).await?;
        }
        Ok(())
    }
}
