//! End-to-end activation flows through the `ModuleLoader` facade.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use stagehand_kernel::config::RuntimeConfig;
use stagehand_kernel::context::BootstrapContext;
use stagehand_kernel::error::LoaderError;
use stagehand_kernel::module::{
    LoadCondition, LoadStatus, LoadType, ModuleConfig, ModuleDescriptor, ModuleLoader,
};
use stagehand_kernel::route::Route;
use stagehand_test_utils::{
    test_module, test_module_with_deps, MapResolver, RecordingLocales, RecordingRouter,
    StaticAccess,
};

struct Harness {
    loader: ModuleLoader,
    router: Arc<RecordingRouter>,
    order: Arc<Mutex<Vec<String>>>,
}

fn harness(config: RuntimeConfig) -> Harness {
    let router = Arc::new(RecordingRouter::new());
    let ctx = Arc::new(BootstrapContext::new());
    ctx.set_router(router.clone());
    ctx.set_locales(Arc::new(RecordingLocales::new()));
    ctx.set_access(Arc::new(StaticAccess::new().with_flag("beta")));
    Harness {
        loader: ModuleLoader::new(ctx, &config),
        router,
        order: Arc::new(Mutex::new(Vec::new())),
    }
}

impl Harness {
    /// A config whose init hook records the module name on activation.
    fn tracking_config(&self, name: &str) -> ModuleConfig {
        let order = self.order.clone();
        let name = name.to_string();
        ModuleConfig::builder()
            .init(move |_ctx| {
                let order = order.clone();
                let name = name.clone();
                async move {
                    order.lock().push(name);
                    Ok(())
                }
            })
            .build()
    }

    fn tracking_module(&self, name: &str, load_type: LoadType) -> ModuleDescriptor {
        ModuleDescriptor::new(name, load_type, self.tracking_config(name))
    }
}

#[tokio::test]
async fn init_modules_activate_by_priority_with_stable_ties() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_modules([
            h.tracking_module("A", LoadType::Init).with_priority(0),
            h.tracking_module("B", LoadType::Init).with_priority(0),
            h.tracking_module("C", LoadType::Init).with_priority(-1),
        ])
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    assert_eq!(*h.order.lock(), ["C", "A", "B"]);
}

#[tokio::test]
async fn registry_is_closed_after_init_phase() {
    let h = harness(RuntimeConfig::default());
    h.loader.init_init_modules().await.unwrap();

    let err = h
        .loader
        .add_module(test_module("late", LoadType::Normal))
        .unwrap_err();
    assert!(matches!(err, LoaderError::RegistryClosed { .. }));
}

#[tokio::test]
async fn init_failure_halts_remaining_init_modules() {
    let h = harness(RuntimeConfig::default());
    let failing = ModuleDescriptor::new(
        "broken",
        LoadType::Init,
        ModuleConfig::builder()
            .init(|_ctx| async { anyhow::bail!("database unreachable") })
            .build(),
    )
    .with_priority(-1);

    h.loader.add_module(failing).unwrap();
    h.loader
        .add_module(h.tracking_module("after", LoadType::Init))
        .unwrap();

    let err = h.loader.init_init_modules().await.unwrap_err();
    assert!(matches!(err, LoaderError::InitHook { .. }));
    assert_eq!(h.loader.module_status("broken"), LoadStatus::Failed);
    assert_eq!(h.loader.module_status("after"), LoadStatus::Pending);
    assert!(h.order.lock().is_empty());
}

#[tokio::test]
async fn normal_modules_load_level_by_level() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_modules([
            h.tracking_module("auth", LoadType::Normal),
            h.tracking_module("catalog", LoadType::Normal),
            h.tracking_module("cart", LoadType::Normal)
                .with_condition(LoadCondition::new().with_dependencies(["auth", "catalog"])),
            h.tracking_module("checkout", LoadType::Normal)
                .with_condition(LoadCondition::new().with_dependencies(["cart"])),
        ])
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();

    let order = h.order.lock().clone();
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(position("auth") < position("cart"));
    assert!(position("catalog") < position("cart"));
    assert!(position("cart") < position("checkout"));
    for name in ["auth", "catalog", "cart", "checkout"] {
        assert!(h.loader.is_module_loaded(name), "{name} should be loaded");
    }
}

#[tokio::test]
async fn normal_modules_require_completed_init_phase() {
    let h = harness(RuntimeConfig::default());
    let err = h.loader.load_normal_modules().await.unwrap_err();
    assert!(matches!(err, LoaderError::InitPhaseIncomplete));
}

#[tokio::test]
async fn unmet_feature_flag_is_recorded_not_raised() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_module(
            h.tracking_module("experimental", LoadType::Normal)
                .with_condition(LoadCondition::new().with_feature_flags(["x"])),
        )
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();

    assert_eq!(h.loader.module_status("experimental"), LoadStatus::Failed);
    let error = h.loader.module_error("experimental").unwrap();
    assert!(error.contains("feature flags"));
    assert!(error.contains('x'));
    assert!(h.order.lock().is_empty());
}

#[tokio::test]
async fn failure_within_a_level_is_isolated_to_that_module() {
    let h = harness(RuntimeConfig::default());
    let failing = ModuleDescriptor::new(
        "broken",
        LoadType::Normal,
        ModuleConfig::builder()
            .init(|_ctx| async { anyhow::bail!("boom") })
            .build(),
    );
    h.loader.add_module(failing).unwrap();
    h.loader
        .add_module(h.tracking_module("sibling", LoadType::Normal))
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();

    assert_eq!(h.loader.module_status("broken"), LoadStatus::Failed);
    assert!(h.loader.is_module_loaded("sibling"));
}

#[tokio::test]
async fn failed_dependency_gates_dependent_modules() {
    let h = harness(RuntimeConfig::default());
    let failing = ModuleDescriptor::new(
        "base",
        LoadType::Normal,
        ModuleConfig::builder()
            .init(|_ctx| async { anyhow::bail!("boom") })
            .build(),
    );
    h.loader.add_module(failing).unwrap();
    h.loader
        .add_module(
            h.tracking_module("dependent", LoadType::Normal)
                .with_condition(LoadCondition::new().with_dependencies(["base"])),
        )
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();

    assert_eq!(h.loader.module_status("base"), LoadStatus::Failed);
    assert_eq!(h.loader.module_status("dependent"), LoadStatus::Failed);
    assert!(h
        .loader
        .module_error("dependent")
        .unwrap()
        .contains("base"));
}

#[tokio::test]
async fn double_activation_adds_no_side_effects() {
    let h = harness(RuntimeConfig::default());
    let config = ModuleConfig::builder()
        .routes(vec![Route::new("billing.home", "/billing")])
        .build();
    h.loader
        .add_module(ModuleDescriptor::new("billing", LoadType::Normal, config))
        .unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();
    let registered_once = h.router.len();

    h.loader.load_normal_modules().await.unwrap();
    h.loader.load_lazy_module("billing").await.unwrap();
    assert_eq!(h.router.len(), registered_once);
}

#[tokio::test]
async fn lazy_module_loads_with_dependency_chain() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_modules([
            h.tracking_module("session", LoadType::Lazy),
            h.tracking_module("billing", LoadType::Lazy)
                .with_condition(LoadCondition::new().with_dependencies(["session"])),
        ])
        .unwrap();

    h.loader.load_lazy_module("billing").await.unwrap();
    assert_eq!(*h.order.lock(), ["session", "billing"]);
}

#[tokio::test]
async fn lazy_cycle_is_reported() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_modules([
            test_module_with_deps("a", LoadType::Lazy, &["b"]),
            test_module_with_deps("b", LoadType::Lazy, &["a"]),
        ])
        .unwrap();

    let err = h.loader.load_lazy_module("a").await.unwrap_err();
    assert!(matches!(err, LoaderError::CircularDependency { .. }));
}

#[tokio::test]
async fn missing_dependency_lists_all_names() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .add_module(test_module_with_deps(
            "cart",
            LoadType::Lazy,
            &["ghost", "phantom"],
        ))
        .unwrap();

    let err = h.loader.load_lazy_module("cart").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("ghost"));
    assert!(msg.contains("phantom"));
}

#[tokio::test]
async fn route_lookup_falls_back_to_first_segment() {
    let h = harness(RuntimeConfig::default());
    let config = ModuleConfig::builder()
        .routes(vec![Route::new("billing.home", "/billing")])
        .build();
    h.loader
        .add_module(ModuleDescriptor::new("billing", LoadType::Lazy, config))
        .unwrap();

    // no exact index entry for billing.invoices; the first segment
    // "billing" resolves the owning module
    h.loader
        .auto_load_module_by_route("billing.invoices")
        .await
        .unwrap();
    assert!(h.loader.is_module_loaded("billing"));
}

#[tokio::test]
async fn unowned_route_is_ignored() {
    let h = harness(RuntimeConfig::default());
    h.loader
        .auto_load_module_by_route("kernel.settings")
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_module_is_an_error() {
    let h = harness(RuntimeConfig::default());
    let err = h.loader.load_lazy_module("ghost").await.unwrap_err();
    assert!(matches!(err, LoaderError::UnknownModule { .. }));
}

#[tokio::test]
async fn deferred_config_resolves_once_and_is_memoized() {
    let resolver = Arc::new(MapResolver::new().with_config(
        "https://cdn.example.com/billing.js",
        ModuleConfig::builder()
            .routes(vec![Route::new("billing.invoices", "/billing/invoices")])
            .build(),
    ));

    let router = Arc::new(RecordingRouter::new());
    let ctx = Arc::new(BootstrapContext::new());
    ctx.set_router(router.clone());
    ctx.set_locales(Arc::new(RecordingLocales::new()));
    ctx.set_resolver(resolver.clone());
    let loader = ModuleLoader::new(ctx, &RuntimeConfig::default());

    loader
        .add_module(ModuleDescriptor::deferred(
            "billing",
            LoadType::Lazy,
            "https://cdn.example.com/billing.js",
        ))
        .unwrap();

    // routes are unknown until the config resolves
    assert_eq!(loader.registry().route_count(), 0);

    loader.preload_routes().await.unwrap();
    assert_eq!(router.route_names(), ["billing.invoices"]);

    loader.load_lazy_module("billing").await.unwrap();
    assert!(loader.is_module_loaded("billing"));
    assert_eq!(resolver.calls_for("https://cdn.example.com/billing.js"), 1);
    // preload already handed the route over; activation must not repeat it
    assert_eq!(router.len(), 1);
}

#[tokio::test]
async fn preloaded_lazy_route_triggers_activation_on_first_entry() {
    let h = harness(RuntimeConfig::default());
    let config = ModuleConfig::builder()
        .routes(vec![Route::new("billing.home", "/billing")])
        .build();
    h.loader
        .add_module(ModuleDescriptor::new("billing", LoadType::Lazy, config))
        .unwrap();

    h.loader.preload_routes().await.unwrap();
    assert!(!h.loader.is_module_loaded("billing"));

    let route = h.router.route("billing.home").unwrap();
    let on_enter = route.on_enter.expect("lazy route must carry a wrapped entry hook");
    on_enter().await;
    assert!(h.loader.is_module_loaded("billing"));
}

#[tokio::test]
async fn preload_skips_gated_lazy_modules() {
    let h = harness(RuntimeConfig::default());
    let config = ModuleConfig::builder()
        .routes(vec![Route::new("labs.home", "/labs")])
        .build();
    h.loader
        .add_module(
            ModuleDescriptor::new("labs", LoadType::Lazy, config)
                .with_condition(LoadCondition::new().with_feature_flags(["labs-enabled"])),
        )
        .unwrap();

    h.loader.preload_routes().await.unwrap();
    assert!(h.router.is_empty());
    // preload is not an activation attempt, the module stays pending
    assert_eq!(h.loader.module_status("labs"), LoadStatus::Pending);
}

#[tokio::test]
async fn hung_init_hook_times_out_and_fails_the_module() {
    let config = RuntimeConfig {
        init_timeout: Some(Duration::from_millis(50)),
        ..RuntimeConfig::default()
    };
    let h = harness(config);
    let hanging = ModuleDescriptor::new(
        "sleepy",
        LoadType::Normal,
        ModuleConfig::builder()
            .init(|_ctx| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .build(),
    );
    h.loader.add_module(hanging).unwrap();

    h.loader.init_init_modules().await.unwrap();
    h.loader.load_normal_modules().await.unwrap();

    assert_eq!(h.loader.module_status("sleepy"), LoadStatus::Failed);
    assert!(h
        .loader
        .module_error("sleepy")
        .unwrap()
        .contains("timed out"));
}
