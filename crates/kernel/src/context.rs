//! Shared bootstrap context handed from step to step and into module init
//! hooks.
//!
//! The context is a small service locator: the configured API endpoint, the
//! collaborator handles (router, localization, access control, config
//! resolver), and free-form parameters from the startup manifest. Module
//! init hooks receive it read-only by convention; all registry and status
//! mutation goes through the orchestrator.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map as JsonMap, Value as JsonValue};
use url::Url;

use crate::access::AccessDecider;
use crate::locale::LocaleStore;
use crate::module::ConfigResolver;
use crate::route::RouteRegistrar;

/// Shared mutable context for the bootstrap pipeline and module init hooks.
#[derive(Default)]
pub struct BootstrapContext {
    api_base_url: RwLock<Option<Url>>,
    params: RwLock<JsonMap<String, JsonValue>>,
    access: RwLock<Option<Arc<dyn AccessDecider>>>,
    router: RwLock<Option<Arc<dyn RouteRegistrar>>>,
    locales: RwLock<Option<Arc<dyn LocaleStore>>>,
    resolver: RwLock<Option<Arc<dyn ConfigResolver>>>,
}

impl BootstrapContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the configured API endpoint.
    pub fn set_api_base_url(&self, url: Url) {
        *self.api_base_url.write() = Some(url);
    }

    /// The configured API endpoint, if the client step has run.
    pub fn api_base_url(&self) -> Option<Url> {
        self.api_base_url.read().clone()
    }

    /// Merge startup parameters into the context.
    pub fn merge_params(&self, params: JsonMap<String, JsonValue>) {
        self.params.write().extend(params);
    }

    /// Look up a startup parameter by key.
    pub fn param(&self, key: &str) -> Option<JsonValue> {
        self.params.read().get(key).cloned()
    }

    /// Install the access-control collaborator.
    pub fn set_access(&self, access: Arc<dyn AccessDecider>) {
        *self.access.write() = Some(access);
    }

    /// The access-control collaborator, if configured.
    pub fn access(&self) -> Option<Arc<dyn AccessDecider>> {
        self.access.read().clone()
    }

    /// Install the route registrar collaborator.
    pub fn set_router(&self, router: Arc<dyn RouteRegistrar>) {
        *self.router.write() = Some(router);
    }

    /// The route registrar, if configured.
    pub fn router(&self) -> Option<Arc<dyn RouteRegistrar>> {
        self.router.read().clone()
    }

    /// Install the localization store collaborator.
    pub fn set_locales(&self, locales: Arc<dyn LocaleStore>) {
        *self.locales.write() = Some(locales);
    }

    /// The localization store, if configured.
    pub fn locales(&self) -> Option<Arc<dyn LocaleStore>> {
        self.locales.read().clone()
    }

    /// Install the deferred-config resolver collaborator.
    pub fn set_resolver(&self, resolver: Arc<dyn ConfigResolver>) {
        *self.resolver.write() = Some(resolver);
    }

    /// The deferred-config resolver, if configured.
    pub fn resolver(&self) -> Option<Arc<dyn ConfigResolver>> {
        self.resolver.read().clone()
    }
}

impl fmt::Debug for BootstrapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapContext")
            .field("api_base_url", &self.api_base_url.read())
            .field("params", &self.params.read().len())
            .field("access", &self.access.read().is_some())
            .field("router", &self.router.read().is_some())
            .field("locales", &self.locales.read().is_some())
            .field("resolver", &self.resolver.read().is_some())
            .finish()
    }
}
