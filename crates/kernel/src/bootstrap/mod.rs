//! Sequential bootstrap pipeline.
//!
//! A fixed, ordered list of initialization steps run in a loop, each step
//! one concern, all sharing one mutable pipeline state. Any step may fail;
//! the pipeline then aborts with the step name attached and the error
//! surfaces to the host, which is expected to log it and may render a
//! degraded UI. On success the host receives the finished context plus the
//! module loader and is expected to call `load_normal_modules` after first
//! render.
//!
//! Step order: API client, routing, localization, manifest ingestion,
//! module-loader setup (which runs the init phase synchronously), route
//! finalization (which preloads routes for all non-init modules).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info};
use url::Url;

use crate::access::{AccessDecider, ManifestAccess};
use crate::config::RuntimeConfig;
use crate::context::BootstrapContext;
use crate::locale::LocaleStore;
use crate::manifest::StartupManifest;
use crate::module::{ConfigResolver, ConfigSlot, ModuleConfig, ModuleDescriptor, ModuleLoader};
use crate::route::RouteRegistrar;

/// One bootstrap step: borrows the pipeline state, does one concern.
type StepFn = for<'a> fn(&'a mut Bootstrap) -> BoxFuture<'a, Result<()>>;

/// The finished pipeline output handed to the host.
pub struct Bootstrapped {
    /// The shared context, as passed to module init hooks.
    pub ctx: Arc<BootstrapContext>,
    /// The module loader, init phase already complete.
    pub loader: ModuleLoader,
}

impl fmt::Debug for Bootstrapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapped")
            .field("ctx", &self.ctx)
            .field("modules", &self.loader.registry().len())
            .finish()
    }
}

/// Mutable pipeline state threaded through the bootstrap steps.
pub struct Bootstrap {
    config: RuntimeConfig,
    ctx: Arc<BootstrapContext>,
    manifest: Option<StartupManifest>,
    definitions: Vec<ModuleDescriptor>,
    local_configs: HashMap<String, ModuleConfig>,
    loader: Option<ModuleLoader>,
}

impl Bootstrap {
    const STEPS: [(&'static str, StepFn); 6] = [
        ("api-client", Self::setup_client),
        ("routing", Self::setup_routing),
        ("localization", Self::setup_localization),
        ("manifest", Self::ingest_manifest),
        ("module-loader", Self::setup_module_loader),
        ("route-finalization", Self::finalize_routes),
    ];

    /// Start assembling a bootstrap pipeline.
    pub fn builder() -> BootstrapBuilder {
        BootstrapBuilder::default()
    }

    /// Run every step in order. The first failure aborts the pipeline.
    pub async fn run(mut self) -> Result<Bootstrapped> {
        for (name, step) in Self::STEPS {
            info!(step = name, "bootstrap step starting");
            step(&mut self)
                .await
                .with_context(|| format!("bootstrap step '{name}' failed"))?;
        }
        let loader = self
            .loader
            .take()
            .context("bootstrap completed without a module loader")?;
        Ok(Bootstrapped {
            ctx: self.ctx,
            loader,
        })
    }

    /// Validate and record the API endpoint.
    fn setup_client(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let url = Url::parse(&self.config.api_base_url)
                .with_context(|| format!("invalid api base url '{}'", self.config.api_base_url))?;
            self.ctx.set_api_base_url(url);
            debug!(url = %self.config.api_base_url, "api client configured");
            Ok(())
        })
    }

    /// The router collaborator must be in place before any module can
    /// contribute routes.
    fn setup_routing(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            anyhow::ensure!(self.ctx.router().is_some(), "no route registrar configured");
            Ok(())
        })
    }

    /// The locale store must be in place before any module registers
    /// bundles.
    fn setup_localization(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            anyhow::ensure!(self.ctx.locales().is_some(), "no locale store configured");
            Ok(())
        })
    }

    /// Validate the startup manifest and convert its entries to
    /// descriptors. Installs a manifest-backed access decider when the host
    /// supplied none.
    fn ingest_manifest(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(manifest) = self.manifest.take() else {
                debug!("no startup manifest supplied");
                return Ok(());
            };
            manifest.validate()?;

            self.ctx.merge_params(manifest.data.params.clone());
            if self.ctx.access().is_none() {
                self.ctx.set_access(Arc::new(ManifestAccess::new(
                    manifest.data.features.clone(),
                    manifest.data.permissions.clone(),
                )));
                debug!("installed manifest-backed access decider");
            }

            for entry in &manifest.data.modules {
                let slot = if entry.remote_entry.is_empty() {
                    let config = self.local_configs.remove(&entry.name).with_context(|| {
                        format!(
                            "manifest module '{}' is locally bundled but no local config was supplied",
                            entry.name
                        )
                    })?;
                    ConfigSlot::resolved(config)
                } else {
                    ConfigSlot::deferred(entry.remote_entry.clone())
                };
                self.definitions.push(entry.to_descriptor(slot));
            }
            info!(modules = manifest.data.modules.len(), "manifest ingested");
            Ok(())
        })
    }

    /// Build the loader, register every descriptor (dropping force-disabled
    /// modules), and run the init phase synchronously.
    fn setup_module_loader(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let loader = ModuleLoader::new(self.ctx.clone(), &self.config);
            for module in std::mem::take(&mut self.definitions) {
                if self.config.is_disabled(module.name()) {
                    info!(
                        module = module.name(),
                        "module disabled by configuration, skipping"
                    );
                    continue;
                }
                loader.add_module(module)?;
            }
            loader.init_init_modules().await?;
            self.loader = Some(loader);
            Ok(())
        })
    }

    /// Preload routes for all non-init modules so the router knows every
    /// navigable route before first paint.
    fn finalize_routes(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let loader = self.loader.as_ref().context("module loader not initialized")?;
            loader.preload_routes().await?;
            info!(
                routes = loader.registry().route_count(),
                "routes finalized"
            );
            Ok(())
        })
    }
}

/// Builder wiring collaborators, module definitions, and the manifest into
/// a [`Bootstrap`] pipeline.
#[derive(Default)]
pub struct BootstrapBuilder {
    config: Option<RuntimeConfig>,
    access: Option<Arc<dyn AccessDecider>>,
    router: Option<Arc<dyn RouteRegistrar>>,
    locales: Option<Arc<dyn LocaleStore>>,
    resolver: Option<Arc<dyn ConfigResolver>>,
    manifest: Option<StartupManifest>,
    definitions: Vec<ModuleDescriptor>,
    local_configs: HashMap<String, ModuleConfig>,
}

impl BootstrapBuilder {
    /// Use an explicit runtime config instead of the defaults.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Install the host's access decider. Without one, a manifest-backed
    /// decider is used when a manifest is supplied; otherwise gates fail
    /// closed.
    pub fn access(mut self, access: Arc<dyn AccessDecider>) -> Self {
        self.access = Some(access);
        self
    }

    /// Install the route registrar collaborator (required).
    pub fn router(mut self, router: Arc<dyn RouteRegistrar>) -> Self {
        self.router = Some(router);
        self
    }

    /// Install the locale store collaborator (required).
    pub fn locales(mut self, locales: Arc<dyn LocaleStore>) -> Self {
        self.locales = Some(locales);
        self
    }

    /// Install the deferred-config resolver used by remotely loaded
    /// modules.
    pub fn resolver(mut self, resolver: Arc<dyn ConfigResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Supply the validated-on-run startup manifest.
    pub fn manifest(mut self, manifest: StartupManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Register a statically known module definition.
    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.definitions.push(module);
        self
    }

    /// Register a batch of statically known module definitions.
    pub fn modules(mut self, modules: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        self.definitions.extend(modules);
        self
    }

    /// Supply the config for a locally bundled module named by the
    /// manifest (one whose `remoteEntry` is empty).
    pub fn local_config(mut self, name: impl Into<String>, config: ModuleConfig) -> Self {
        self.local_configs.insert(name.into(), config);
        self
    }

    /// Assemble the pipeline.
    pub fn build(self) -> Bootstrap {
        let ctx = Arc::new(BootstrapContext::new());
        if let Some(access) = self.access {
            ctx.set_access(access);
        }
        if let Some(router) = self.router {
            ctx.set_router(router);
        }
        if let Some(locales) = self.locales {
            ctx.set_locales(locales);
        }
        if let Some(resolver) = self.resolver {
            ctx.set_resolver(resolver);
        }

        Bootstrap {
            config: self.config.unwrap_or_default(),
            ctx,
            manifest: self.manifest,
            definitions: self.definitions,
            local_configs: self.local_configs,
            loader: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::locale::LocaleStore;
    use crate::route::{Route, RouteRegistrar};
    use serde_json::Value as JsonValue;

    struct NullRouter;
    impl RouteRegistrar for NullRouter {
        fn register_routes(&self, _routes: Vec<Route>) {}
    }

    struct NullLocales;
    impl LocaleStore for NullLocales {
        fn add_resource_bundle(&self, _locale: &str, _namespace: &str, _bundle: JsonValue) {}
    }

    fn minimal_builder() -> BootstrapBuilder {
        Bootstrap::builder()
            .router(Arc::new(NullRouter))
            .locales(Arc::new(NullLocales))
    }

    #[tokio::test]
    async fn pipeline_completes_without_modules() {
        let done = minimal_builder().build().run().await.unwrap();
        assert!(done.ctx.api_base_url().is_some());
        assert!(done.loader.registry().is_sealed());
    }

    #[tokio::test]
    async fn pipeline_output_is_debug_printable() {
        let done = minimal_builder()
            .module(ModuleDescriptor::new(
                "billing",
                crate::module::LoadType::Normal,
                ModuleConfig::empty(),
            ))
            .build()
            .run()
            .await
            .unwrap();
        let rendered = format!("{done:?}");
        assert!(rendered.contains("Bootstrapped"));
        assert!(rendered.contains("modules: 1"));
    }

    #[tokio::test]
    async fn missing_router_aborts_with_step_context() {
        let err = Bootstrap::builder()
            .locales(Arc::new(NullLocales))
            .build()
            .run()
            .await
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("bootstrap step 'routing' failed"));
    }

    #[tokio::test]
    async fn invalid_api_url_aborts_first_step() {
        let config = RuntimeConfig {
            api_base_url: "not a url".to_string(),
            ..RuntimeConfig::default()
        };
        let err = minimal_builder().config(config).build().run().await.unwrap_err();
        assert!(format!("{err:#}").contains("api-client"));
    }

    #[tokio::test]
    async fn manifest_module_without_local_config_aborts() {
        let manifest = StartupManifest::from_json(
            r#"{"status": "ok", "data": {"modules": [
                {"name": "billing", "loadType": "normal", "remoteEntry": ""}
            ]}}"#,
        )
        .unwrap();
        let err = minimal_builder()
            .manifest(manifest)
            .build()
            .run()
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("locally bundled"));
    }

    #[tokio::test]
    async fn disabled_module_is_never_registered() {
        let config = RuntimeConfig {
            disabled_modules: vec!["billing".to_string()],
            ..RuntimeConfig::default()
        };
        let done = minimal_builder()
            .config(config)
            .module(ModuleDescriptor::new(
                "billing",
                crate::module::LoadType::Normal,
                ModuleConfig::empty(),
            ))
            .build()
            .run()
            .await
            .unwrap();
        assert!(done.loader.get_module("billing").is_none());
    }
}
