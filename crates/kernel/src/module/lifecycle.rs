//! Per-module activation side effects.
//!
//! Registering routes (with lazy-load wrapping for lazy modules),
//! forwarding locale bundles, running the init hook under the configured
//! timeout, and registering auxiliary mock handlers. Every side effect is
//! idempotent per module, guarded by the status tracker's marks, so a
//! preload pass followed by full activation never duplicates work.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::context::BootstrapContext;
use crate::error::LoaderError;
use crate::route::{Route, RouteHook};

use super::{LoadType, ModuleDescriptor, ModuleRegistry, StatusTracker};

/// Callback that triggers a lazy module's activation by name. Supplied by
/// the facade; failures are logged inside, not surfaced to the router.
pub type LazyTrigger = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Performs the per-module side effects of activation.
pub struct LifecycleManager {
    registry: Arc<ModuleRegistry>,
    status: Arc<StatusTracker>,
    init_timeout: Option<Duration>,
    enable_mocks: bool,
}

impl LifecycleManager {
    /// Create a lifecycle manager wired to the registry and status tracker.
    pub fn new(
        registry: Arc<ModuleRegistry>,
        status: Arc<StatusTracker>,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            status,
            init_timeout: config.init_timeout,
            enable_mocks: config.enable_mock_handlers,
        }
    }

    /// Obtain the module's routes (resolving a deferred config first), index
    /// them, and hand them to the external router. For lazy modules each
    /// route's entry callback is wrapped so that first navigation triggers
    /// the module load; the wrapper composes with any pre-existing callback.
    ///
    /// No-op if the module's routes were already registered.
    pub async fn register_routes(
        &self,
        module: &Arc<ModuleDescriptor>,
        ctx: &BootstrapContext,
        lazy_trigger: Option<&LazyTrigger>,
    ) -> Result<(), LoaderError> {
        if self.status.routes_registered(module.name()) {
            return Ok(());
        }

        let config = module.config().resolve(module.name(), ctx).await?;
        let mut routes = config.routes();
        self.registry.index_routes(module.name(), &routes);

        if module.load_type() == LoadType::Lazy {
            if let Some(trigger) = lazy_trigger {
                for route in &mut routes {
                    wrap_lazy_entry(route, module.name(), trigger);
                }
            }
        }

        let count = routes.len();
        match ctx.router() {
            Some(router) => router.register_routes(routes),
            None => warn!(
                module = module.name(),
                "no route registrar configured, routes dropped"
            ),
        }

        self.status.mark_routes_registered(module.name());
        debug!(module = module.name(), routes = count, "routes registered");
        Ok(())
    }

    /// Forward the module's locale bundles to the localization store.
    /// Invoked at most once per module.
    pub async fn register_localization(
        &self,
        module: &Arc<ModuleDescriptor>,
        ctx: &BootstrapContext,
    ) -> Result<(), LoaderError> {
        if self.status.locale_registered(module.name()) {
            return Ok(());
        }

        let config = module.config().resolve(module.name(), ctx).await?;
        if let Some(hook) = config.locale_hook() {
            match ctx.locales() {
                Some(store) => hook(store.as_ref()),
                None => warn!(
                    module = module.name(),
                    "no locale store configured, bundles dropped"
                ),
            }
        }

        self.status.mark_locale_registered(module.name());
        debug!(module = module.name(), "localization registered");
        Ok(())
    }

    /// Resolve the config if needed, then run the module's init hook with
    /// the shared context and register auxiliary mock handlers. Route
    /// pre-registration passes never reach this; they stop after routes and
    /// locale wiring.
    pub async fn initialize_module(
        &self,
        module: &Arc<ModuleDescriptor>,
        ctx: &Arc<BootstrapContext>,
    ) -> Result<(), LoaderError> {
        let config = module.config().resolve(module.name(), ctx).await?;

        if let Some(hook) = config.init_hook() {
            let fut = hook(ctx.clone());
            let result = match self.init_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(LoaderError::InitTimeout {
                            module: module.name().to_string(),
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                },
                None => fut.await,
            };
            result.map_err(|e| LoaderError::InitHook {
                module: module.name().to_string(),
                details: format!("{e:#}"),
            })?;
        }

        if self.enable_mocks {
            if let Some(mocks) = config.mock_hook() {
                mocks(ctx);
                debug!(module = module.name(), "mock handlers registered");
            }
        }

        Ok(())
    }
}

/// Wrap a route's entry callback so the owning lazy module loads on first
/// navigation, then the original callback (if any) runs.
fn wrap_lazy_entry(route: &mut Route, module: &str, trigger: &LazyTrigger) {
    let original: Option<RouteHook> = route.on_enter.take();
    let trigger = trigger.clone();
    let module = module.to_string();

    route.on_enter = Some(Arc::new(move || {
        let trigger = trigger.clone();
        let module = module.clone();
        let original = original.clone();
        Box::pin(async move {
            trigger(module).await;
            if let Some(original) = original {
                original().await;
            }
        })
    }));
}
