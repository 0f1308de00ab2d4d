//! Module descriptors, configs, and the activation orchestrator.
//!
//! This module handles:
//! - Descriptor and config types for pluggable feature modules
//! - The registry, dependency resolver, and load-level builder
//! - Per-module lifecycle side effects and status tracking
//! - The `ModuleLoader` facade composing them into the four activation paths

mod dependency;
mod levels;
mod lifecycle;
mod loader;
mod registry;
mod status;

pub use dependency::{DependencyResolver, LoadOne};
pub use levels::build_load_levels;
pub use lifecycle::{LazyTrigger, LifecycleManager};
pub use loader::ModuleLoader;
pub use registry::ModuleRegistry;
pub use status::{LoadStatus, StatusRecord, StatusTracker};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::BootstrapContext;
use crate::error::LoaderError;
use crate::locale::{LocaleHook, LocaleStore};
use crate::route::Route;

/// When in the session a module is activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    /// Activated synchronously and sequentially before any other phase.
    /// Init modules cannot declare load conditions.
    Init,
    /// Activated concurrently, grouped by dependency level, after the init
    /// phase and after first render.
    Normal,
    /// Activated on demand: first navigation into an owned route, or an
    /// explicit request. Its config may be fetched asynchronously.
    Lazy,
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadType::Init => write!(f, "init"),
            LoadType::Normal => write!(f, "normal"),
            LoadType::Lazy => write!(f, "lazy"),
        }
    }
}

/// Gate on a module's activation: required feature flags, required access
/// permissions, and modules that must already be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadCondition {
    /// Feature flags that must all be enabled.
    pub feature_flags: Vec<String>,
    /// Permissions the acting principal must hold.
    pub access_permissions: Vec<String>,
    /// Modules that must load before this one.
    pub dependencies: Vec<String>,
}

impl LoadCondition {
    /// An empty condition (gates nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require feature flags.
    pub fn with_feature_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Require permissions.
    pub fn with_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_permissions = perms.into_iter().map(Into::into).collect();
        self
    }

    /// Require dependency modules.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the condition gates nothing at all.
    pub fn is_empty(&self) -> bool {
        self.feature_flags.is_empty()
            && self.access_permissions.is_empty()
            && self.dependencies.is_empty()
    }
}

/// Function producing a module's route list.
pub type RoutesFn = Arc<dyn Fn() -> Vec<Route> + Send + Sync>;

/// Async init hook invoked once on activation with the shared context.
pub type InitHook =
    Arc<dyn Fn(Arc<BootstrapContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Auxiliary mock/test handler registration, run only when the runtime
/// config enables mock handlers.
pub type MockHook = Arc<dyn Fn(&BootstrapContext) + Send + Sync>;

/// Behavior contributed by a module: routes, localization, init hook, and
/// optional mock handlers.
#[derive(Clone)]
pub struct ModuleConfig {
    routes: RoutesFn,
    locale: Option<LocaleHook>,
    init: Option<InitHook>,
    mocks: Option<MockHook>,
}

impl ModuleConfig {
    /// Start building a config.
    pub fn builder() -> ModuleConfigBuilder {
        ModuleConfigBuilder::default()
    }

    /// A config contributing nothing (no routes, no hooks).
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Produce the module's route list.
    pub fn routes(&self) -> Vec<Route> {
        (self.routes)()
    }

    pub(crate) fn locale_hook(&self) -> Option<&LocaleHook> {
        self.locale.as_ref()
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook> {
        self.init.as_ref()
    }

    pub(crate) fn mock_hook(&self) -> Option<&MockHook> {
        self.mocks.as_ref()
    }
}

impl fmt::Debug for ModuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleConfig")
            .field("locale", &self.locale.is_some())
            .field("init", &self.init.is_some())
            .field("mocks", &self.mocks.is_some())
            .finish()
    }
}

/// Builder for [`ModuleConfig`].
#[derive(Default)]
pub struct ModuleConfigBuilder {
    routes: Option<RoutesFn>,
    locale: Option<LocaleHook>,
    init: Option<InitHook>,
    mocks: Option<MockHook>,
}

impl ModuleConfigBuilder {
    /// Contribute a static route list.
    pub fn routes(self, routes: Vec<Route>) -> Self {
        self.routes_with(move || routes.clone())
    }

    /// Contribute routes through a producer function.
    pub fn routes_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Vec<Route> + Send + Sync + 'static,
    {
        self.routes = Some(Arc::new(f));
        self
    }

    /// Register localization bundles on activation.
    pub fn locale<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn LocaleStore) + Send + Sync + 'static,
    {
        self.locale = Some(Arc::new(f));
        self
    }

    /// Run an async init hook on activation.
    pub fn init<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<BootstrapContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.init = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    /// Register auxiliary mock handlers on activation.
    pub fn mocks<F>(mut self, f: F) -> Self
    where
        F: Fn(&BootstrapContext) + Send + Sync + 'static,
    {
        self.mocks = Some(Arc::new(f));
        self
    }

    /// Finish the config.
    pub fn build(self) -> ModuleConfig {
        ModuleConfig {
            routes: self.routes.unwrap_or_else(|| Arc::new(Vec::new)),
            locale: self.locale,
            init: self.init,
            mocks: self.mocks,
        }
    }
}

/// Resolves deferred module configs from their locator (e.g. a remote
/// bundle URL). The fetch mechanism belongs to the host.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Fetch and build the config identified by `locator`.
    async fn resolve(&self, locator: &str) -> anyhow::Result<ModuleConfig>;
}

enum ConfigState {
    Unresolved { locator: String },
    Resolved(Arc<ModuleConfig>),
}

/// A module config that is either present or still a pending fetch.
///
/// Lazy modules may ship only a locator; the config is fetched once on first
/// use and memoized in place. The sum type avoids swapping a shared pointer
/// mid-iteration: the slot itself never moves.
pub struct ConfigSlot {
    state: RwLock<ConfigState>,
}

impl ConfigSlot {
    /// A slot holding an already-built config.
    pub fn resolved(config: ModuleConfig) -> Self {
        Self {
            state: RwLock::new(ConfigState::Resolved(Arc::new(config))),
        }
    }

    /// A slot deferring to `locator` until first use.
    pub fn deferred(locator: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ConfigState::Unresolved {
                locator: locator.into(),
            }),
        }
    }

    /// The config, if already resolved.
    pub fn get(&self) -> Option<Arc<ModuleConfig>> {
        match &*self.state.read() {
            ConfigState::Resolved(config) => Some(config.clone()),
            ConfigState::Unresolved { .. } => None,
        }
    }

    /// The pending locator, if not yet resolved.
    pub fn locator(&self) -> Option<String> {
        match &*self.state.read() {
            ConfigState::Unresolved { locator } => Some(locator.clone()),
            ConfigState::Resolved(_) => None,
        }
    }

    /// Whether the config is available without a fetch.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.state.read(), ConfigState::Resolved(_))
    }

    /// Return the config, fetching it through the context's resolver on
    /// first use. The result is memoized; a concurrent resolve that loses
    /// the race keeps the first stored config.
    pub(crate) async fn resolve(
        &self,
        module: &str,
        ctx: &BootstrapContext,
    ) -> Result<Arc<ModuleConfig>, LoaderError> {
        if let Some(config) = self.get() {
            return Ok(config);
        }
        let locator = self.locator().unwrap_or_default();
        let resolver = ctx.resolver().ok_or_else(|| LoaderError::ConfigResolve {
            module: module.to_string(),
            locator: locator.clone(),
            details: "no config resolver configured".to_string(),
        })?;

        let config = resolver
            .resolve(&locator)
            .await
            .map_err(|e| LoaderError::ConfigResolve {
                module: module.to_string(),
                locator: locator.clone(),
                details: format!("{e:#}"),
            })?;

        let mut state = self.state.write();
        if let ConfigState::Resolved(existing) = &*state {
            return Ok(existing.clone());
        }
        let config = Arc::new(config);
        *state = ConfigState::Resolved(config.clone());
        Ok(config)
    }
}

impl fmt::Debug for ConfigSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.read() {
            ConfigState::Resolved(_) => write!(f, "ConfigSlot::Resolved"),
            ConfigState::Unresolved { locator } => {
                write!(f, "ConfigSlot::Unresolved({locator})")
            }
        }
    }
}

/// Identity and policy metadata for a pluggable feature module.
#[derive(Debug)]
pub struct ModuleDescriptor {
    name: String,
    load_type: LoadType,
    load_priority: i32,
    condition: Option<LoadCondition>,
    config: ConfigSlot,
}

impl ModuleDescriptor {
    /// Create a descriptor with a resolved config, priority 0, no condition.
    pub fn new(name: impl Into<String>, load_type: LoadType, config: ModuleConfig) -> Self {
        Self {
            name: name.into(),
            load_type,
            load_priority: 0,
            condition: None,
            config: ConfigSlot::resolved(config),
        }
    }

    /// Create a descriptor whose config is fetched from `locator` on first
    /// use.
    pub fn deferred(
        name: impl Into<String>,
        load_type: LoadType,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            load_type,
            load_priority: 0,
            condition: None,
            config: ConfigSlot::deferred(locator),
        }
    }

    /// Create a descriptor from an already-built config slot.
    pub fn from_parts(name: impl Into<String>, load_type: LoadType, config: ConfigSlot) -> Self {
        Self {
            name: name.into(),
            load_type,
            load_priority: 0,
            condition: None,
            config,
        }
    }

    /// Set the load priority (lower loads earlier among siblings).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.load_priority = priority;
        self
    }

    /// Attach a load condition.
    pub fn with_condition(mut self, condition: LoadCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Unique module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// When in the session the module activates.
    pub fn load_type(&self) -> LoadType {
        self.load_type
    }

    /// Lower loads earlier among siblings.
    pub fn load_priority(&self) -> i32 {
        self.load_priority
    }

    /// The declared load condition, if any.
    pub fn condition(&self) -> Option<&LoadCondition> {
        self.condition.as_ref()
    }

    /// The config slot (resolved or deferred).
    pub fn config(&self) -> &ConfigSlot {
        &self.config
    }

    /// Declared dependency names, empty when unconditioned.
    pub fn dependency_names(&self) -> &[String] {
        self.condition
            .as_ref()
            .map(|c| c.dependencies.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_produces_no_routes() {
        assert!(ModuleConfig::empty().routes().is_empty());
    }

    #[test]
    fn static_routes_are_reproducible() {
        let config = ModuleConfig::builder()
            .routes(vec![Route::new("billing", "/billing")])
            .build();
        assert_eq!(config.routes().len(), 1);
        assert_eq!(config.routes().len(), 1);
    }

    #[test]
    fn deferred_slot_exposes_locator() {
        let slot = ConfigSlot::deferred("https://cdn.example.com/billing.js");
        assert!(!slot.is_resolved());
        assert_eq!(
            slot.locator().as_deref(),
            Some("https://cdn.example.com/billing.js")
        );
        assert!(slot.get().is_none());
    }

    #[test]
    fn descriptor_dependency_names_default_empty() {
        let module = ModuleDescriptor::new("auth", LoadType::Init, ModuleConfig::empty());
        assert!(module.dependency_names().is_empty());

        let module = ModuleDescriptor::new("cart", LoadType::Normal, ModuleConfig::empty())
            .with_condition(LoadCondition::new().with_dependencies(["auth", "catalog"]));
        assert_eq!(module.dependency_names(), ["auth", "catalog"]);
    }
}
