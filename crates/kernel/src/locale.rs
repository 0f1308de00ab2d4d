//! Localization collaborator interface.
//!
//! Modules contribute localized text as JSON resource bundles keyed by locale
//! and namespace. The concrete localization engine lives in the host; the
//! kernel only forwards bundles through [`LocaleStore`].

use std::sync::Arc;

use serde_json::Value as JsonValue;

/// External localization store collaborator.
pub trait LocaleStore: Send + Sync {
    /// Add a resource bundle for a locale under the given namespace.
    fn add_resource_bundle(&self, locale: &str, namespace: &str, bundle: JsonValue);
}

/// Locale-registration callback contributed by a module config. Invoked at
/// most once per module, with the host's locale store.
pub type LocaleHook = Arc<dyn Fn(&dyn LocaleStore) + Send + Sync>;
