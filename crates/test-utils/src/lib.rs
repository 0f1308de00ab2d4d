//! Stagehand test utilities.
//!
//! Recording fakes for the kernel's external collaborators (router, locale
//! store, access decider, config resolver) plus descriptor fixtures for
//! integration testing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use stagehand_kernel::access::AccessDecider;
use stagehand_kernel::locale::LocaleStore;
use stagehand_kernel::module::{
    ConfigResolver, LoadCondition, LoadType, ModuleConfig, ModuleDescriptor,
};
use stagehand_kernel::route::{Route, RouteRegistrar};

/// Create a test module descriptor with an empty config.
pub fn test_module(name: &str, load_type: LoadType) -> ModuleDescriptor {
    ModuleDescriptor::new(name, load_type, ModuleConfig::empty())
}

/// Create a test module descriptor depending on the given modules.
pub fn test_module_with_deps(name: &str, load_type: LoadType, deps: &[&str]) -> ModuleDescriptor {
    test_module(name, load_type)
        .with_condition(LoadCondition::new().with_dependencies(deps.to_vec()))
}

/// Route registrar fake that records everything handed to it.
#[derive(Default)]
pub struct RecordingRouter {
    routes: Mutex<Vec<Route>>,
}

impl RecordingRouter {
    /// Create an empty recording router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every registered route, in registration order.
    pub fn route_names(&self) -> Vec<String> {
        self.routes.lock().iter().map(|r| r.name.clone()).collect()
    }

    /// Look up a registered route by name.
    pub fn route(&self, name: &str) -> Option<Route> {
        self.routes.lock().iter().find(|r| r.name == name).cloned()
    }

    /// Total number of registered routes (duplicates included, so tests can
    /// assert idempotence).
    pub fn len(&self) -> usize {
        self.routes.lock().len()
    }

    /// Whether no routes were registered.
    pub fn is_empty(&self) -> bool {
        self.routes.lock().is_empty()
    }
}

impl RouteRegistrar for RecordingRouter {
    fn register_routes(&self, routes: Vec<Route>) {
        self.routes.lock().extend(routes);
    }
}

/// Locale store fake recording every bundle registration.
#[derive(Default)]
pub struct RecordingLocales {
    bundles: Mutex<Vec<(String, String)>>,
}

impl RecordingLocales {
    /// Create an empty recording store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(locale, namespace)` pair registered, in order.
    pub fn registered(&self) -> Vec<(String, String)> {
        self.bundles.lock().clone()
    }
}

impl LocaleStore for RecordingLocales {
    fn add_resource_bundle(&self, locale: &str, namespace: &str, _bundle: JsonValue) {
        self.bundles
            .lock()
            .push((locale.to_string(), namespace.to_string()));
    }
}

/// Access decider fake granting a fixed set of flags and permissions.
#[derive(Default)]
pub struct StaticAccess {
    flags: HashSet<String>,
    permissions: HashSet<String>,
}

impl StaticAccess {
    /// A decider granting nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a feature flag.
    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_string());
        self
    }

    /// Grant a permission.
    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }
}

#[async_trait]
impl AccessDecider for StaticAccess {
    async fn has_feature_flags(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.flags.contains(n))
    }

    async fn has_permissions(&self, names: &[String]) -> bool {
        names.iter().all(|n| self.permissions.contains(n))
    }
}

/// Config resolver fake serving configs from an in-memory map and counting
/// resolve calls per locator.
#[derive(Default)]
pub struct MapResolver {
    configs: Mutex<HashMap<String, ModuleConfig>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MapResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `config` for `locator`.
    pub fn with_config(self, locator: &str, config: ModuleConfig) -> Self {
        self.configs.lock().insert(locator.to_string(), config);
        self
    }

    /// How many times `locator` was resolved.
    pub fn calls_for(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ConfigResolver for MapResolver {
    async fn resolve(&self, locator: &str) -> anyhow::Result<ModuleConfig> {
        *self.calls.lock().entry(locator.to_string()).or_insert(0) += 1;
        self.configs
            .lock()
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no config registered for locator '{locator}'"))
    }
}
