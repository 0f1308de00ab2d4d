//! Loader error types with clear, actionable messages.
//!
//! All errors name the affected module and enough context to identify the
//! misconfiguration without a debugger. Condition-gating failures are not
//! errors: they are recorded on the status tracker as an expected outcome
//! (see [`crate::access::UnmetCondition`]).

use thiserror::Error;

/// Errors that can occur during module registration and activation.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A module with this name is already registered.
    #[error("module '{name}' is already registered")]
    DuplicateModule { name: String },

    /// The registry is sealed once the init phase completes.
    #[error("module '{name}' cannot be registered after the init phase has completed")]
    RegistryClosed { name: String },

    /// Init modules load unconditionally and must not declare gates.
    #[error("init module '{name}' must not declare a load condition")]
    InitConditionRejected { name: String },

    /// A module declares dependencies that are not in the registry.
    /// All unresolvable names are collected before reporting.
    #[error("module '{module}' depends on missing module(s): {missing}")]
    MissingDependency { module: String, missing: String },

    /// Circular dependency detected, naming the cycle path.
    #[error("circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// The module's own init hook returned an error.
    #[error("module '{module}': init hook failed: {details}")]
    InitHook { module: String, details: String },

    /// The module's init hook exceeded the configured timeout.
    #[error("module '{module}': init hook timed out after {timeout_ms}ms")]
    InitTimeout { module: String, timeout_ms: u64 },

    /// A deferred module config could not be resolved.
    #[error("module '{module}': failed to resolve config from '{locator}': {details}")]
    ConfigResolve {
        module: String,
        locator: String,
        details: String,
    },

    /// Lookup of a module name that is not registered.
    #[error("unknown module '{name}'")]
    UnknownModule { name: String },

    /// The startup manifest failed validation.
    #[error("invalid startup manifest: {details}")]
    InvalidManifest { details: String },

    /// Normal modules cannot load before `init_init_modules` has run.
    #[error("normal modules cannot load before the init phase completes")]
    InitPhaseIncomplete,
}

impl LoaderError {
    /// Create a missing-dependency error from the collected unresolvable names.
    pub fn missing_dependency(module: impl Into<String>, missing: &[String]) -> Self {
        Self::MissingDependency {
            module: module.into(),
            missing: missing.join(", "),
        }
    }

    /// Create a circular-dependency error naming the cycle path.
    pub fn circular(path: &[String]) -> Self {
        Self::CircularDependency {
            cycle: path.join(" -> "),
        }
    }
}

/// Result type alias using LoaderError.
pub type LoaderResult<T> = Result<T, LoaderError>;
