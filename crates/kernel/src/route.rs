//! Route records contributed by modules.
//!
//! A route is a named, path-addressable navigation target. Names are
//! dot-segmented (`"billing.invoices"`); the first segment conventionally
//! matches the owning module, which is what the route-to-module index falls
//! back on when no exact entry exists. The concrete router is an external
//! collaborator reached through [`RouteRegistrar`].

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Async callback invoked by the external router on navigation entry/exit.
pub type RouteHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A navigation target contributed by a module.
#[derive(Clone)]
pub struct Route {
    /// Dot-segmented route name, e.g. `"billing.invoices"`.
    pub name: String,
    /// URL path pattern (e.g. `/billing/invoices/:id`).
    pub path: String,
    /// Optional navigation menu metadata.
    pub menu: Option<MenuMeta>,
    /// Invoked when the user navigates into the route.
    pub on_enter: Option<RouteHook>,
    /// Invoked when the user navigates away from the route.
    pub on_exit: Option<RouteHook>,
}

impl Route {
    /// Create a route with no menu entry and no lifecycle callbacks.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            menu: None,
            on_enter: None,
            on_exit: None,
        }
    }

    /// Attach menu metadata.
    pub fn with_menu(mut self, menu: MenuMeta) -> Self {
        self.menu = Some(menu);
        self
    }

    /// Attach a navigation-entry callback.
    pub fn with_on_enter(mut self, hook: RouteHook) -> Self {
        self.on_enter = Some(hook);
        self
    }

    /// Attach a navigation-exit callback.
    pub fn with_on_exit(mut self, hook: RouteHook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    /// First dot-segment of the route name.
    pub fn first_segment(&self) -> &str {
        first_segment(&self.name)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("menu", &self.menu)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// Navigation menu metadata for a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuMeta {
    /// Human-readable title.
    pub title: String,
    /// Sort weight (lower = higher priority).
    #[serde(default)]
    pub weight: i32,
    /// Whether this appears in navigation.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Parent route name for hierarchy.
    #[serde(default)]
    pub parent: Option<String>,
}

fn default_true() -> bool {
    true
}

impl MenuMeta {
    /// Create a visible menu entry with default weight.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            weight: 0,
            visible: true,
            parent: None,
        }
    }
}

/// External router collaborator. Must itself be duplicate-safe: the kernel
/// may hand it the same route twice across preload and activation passes.
pub trait RouteRegistrar: Send + Sync {
    /// Register a batch of routes with the navigation engine.
    fn register_routes(&self, routes: Vec<Route>);
}

/// First dot-segment of a route name.
pub fn first_segment(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_of_nested_name() {
        assert_eq!(first_segment("billing.invoices"), "billing");
        assert_eq!(first_segment("billing.invoices.detail"), "billing");
    }

    #[test]
    fn first_segment_of_flat_name() {
        assert_eq!(first_segment("billing"), "billing");
    }

    #[test]
    fn debug_does_not_require_hook_debug() {
        let route = Route::new("billing.invoices", "/billing/invoices")
            .with_on_enter(Arc::new(|| Box::pin(async {})));
        let rendered = format!("{route:?}");
        assert!(rendered.contains("billing.invoices"));
        assert!(rendered.contains("on_enter: true"));
    }
}
