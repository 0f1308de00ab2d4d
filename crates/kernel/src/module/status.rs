//! Per-module load status tracking.
//!
//! Intentionally dumb storage plus convenience predicates: transitions are
//! monotonic (pending -> loading -> loaded | failed, no regression) but the
//! orchestrator is responsible for not attempting a second activation of a
//! module that is already loading.

use std::fmt;

use dashmap::DashMap;

/// Activation state of a single module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    /// No activation attempted yet.
    #[default]
    Pending,
    /// Activation dispatched and in flight.
    Loading,
    /// Activation finished successfully.
    Loaded,
    /// Activation failed or a load condition was unmet. Terminal.
    Failed,
}

impl LoadStatus {
    fn is_terminal(self) -> bool {
        matches!(self, LoadStatus::Loaded | LoadStatus::Failed)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Pending => write!(f, "pending"),
            LoadStatus::Loading => write!(f, "loading"),
            LoadStatus::Loaded => write!(f, "loaded"),
            LoadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status record for one module, created lazily on first activation attempt.
#[derive(Debug, Clone, Default)]
pub struct StatusRecord {
    /// Current activation state.
    pub status: LoadStatus,
    /// Terminal error message, set when `status` is `Failed`.
    pub error: Option<String>,
    /// Whether the module's routes have been handed to the router.
    pub routes_registered: bool,
    /// Whether the module's locale bundles have been registered.
    pub locale_registered: bool,
}

/// Keyed status store, mutated only by the orchestrator.
#[derive(Debug, Default)]
pub struct StatusTracker {
    records: DashMap<String, StatusRecord>,
}

impl StatusTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition a module to `Loading`. No-op once terminal.
    pub fn mark_loading(&self, name: &str) {
        let mut record = self.records.entry(name.to_string()).or_default();
        if !record.status.is_terminal() {
            record.status = LoadStatus::Loading;
        }
    }

    /// Transition a module to `Loaded`. No-op once terminal.
    pub fn mark_loaded(&self, name: &str) {
        let mut record = self.records.entry(name.to_string()).or_default();
        if !record.status.is_terminal() {
            record.status = LoadStatus::Loaded;
            record.error = None;
        }
    }

    /// Transition a module to `Failed` with a descriptive error. No-op once
    /// terminal.
    pub fn mark_failed(&self, name: &str, error: impl Into<String>) {
        let mut record = self.records.entry(name.to_string()).or_default();
        if !record.status.is_terminal() {
            record.status = LoadStatus::Failed;
            record.error = Some(error.into());
        }
    }

    /// Whether the module has finished loading successfully.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.status_of(name) == LoadStatus::Loaded
    }

    /// Whether an activation is currently in flight.
    pub fn is_loading(&self, name: &str) -> bool {
        self.status_of(name) == LoadStatus::Loading
    }

    /// Current status, `Pending` when never attempted.
    pub fn status_of(&self, name: &str) -> LoadStatus {
        self.records
            .get(name)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// Terminal error message, if the module failed.
    pub fn error_of(&self, name: &str) -> Option<String> {
        self.records.get(name).and_then(|r| r.error.clone())
    }

    /// Whether the module's routes were already registered.
    pub fn routes_registered(&self, name: &str) -> bool {
        self.records
            .get(name)
            .map(|r| r.routes_registered)
            .unwrap_or(false)
    }

    /// Mark the module's routes as registered.
    pub fn mark_routes_registered(&self, name: &str) {
        self.records
            .entry(name.to_string())
            .or_default()
            .routes_registered = true;
    }

    /// Whether the module's locale bundles were already registered.
    pub fn locale_registered(&self, name: &str) -> bool {
        self.records
            .get(name)
            .map(|r| r.locale_registered)
            .unwrap_or(false)
    }

    /// Mark the module's locale bundles as registered.
    pub fn mark_locale_registered(&self, name: &str) {
        self.records
            .entry(name.to_string())
            .or_default()
            .locale_registered = true;
    }

    /// Snapshot of every tracked module and its status, for diagnostics.
    pub fn snapshot(&self) -> Vec<(String, LoadStatus)> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status))
            .collect()
    }
}
