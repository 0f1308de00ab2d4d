//! Condition gating against the external access-control collaborator.
//!
//! The kernel never implements authorization. It asks the host's
//! [`AccessDecider`] whether required feature flags and permissions are
//! granted, and checks declared dependency readiness on the status tracker.
//! If no decider is configured, both checks fail closed (return false)
//! rather than erroring.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::context::BootstrapContext;
use crate::module::{ModuleDescriptor, StatusTracker};

/// External access-control collaborator.
#[async_trait]
pub trait AccessDecider: Send + Sync {
    /// Whether every named feature flag is currently enabled.
    async fn has_feature_flags(&self, names: &[String]) -> bool;

    /// Whether the acting principal holds every named permission.
    async fn has_permissions(&self, names: &[String]) -> bool;
}

/// Access decider backed by the startup manifest's feature and permission
/// maps. Installed during bootstrap when the host supplies no decider of its
/// own. Names absent from the map count as denied.
pub struct ManifestAccess {
    features: HashMap<String, bool>,
    permissions: HashMap<String, bool>,
}

impl ManifestAccess {
    /// Build a decider from manifest feature/permission maps.
    pub fn new(features: HashMap<String, bool>, permissions: HashMap<String, bool>) -> Self {
        Self {
            features,
            permissions,
        }
    }
}

#[async_trait]
impl AccessDecider for ManifestAccess {
    async fn has_feature_flags(&self, names: &[String]) -> bool {
        names
            .iter()
            .all(|n| self.features.get(n).copied().unwrap_or(false))
    }

    async fn has_permissions(&self, names: &[String]) -> bool {
        names
            .iter()
            .all(|n| self.permissions.get(n).copied().unwrap_or(false))
    }
}

/// Why a module's load condition was not met.
///
/// This is an expected, recoverable outcome, not an error: it is recorded on
/// the status tracker as `Failed` with a descriptive message and never raised
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmetCondition {
    /// One or more required feature flags are not enabled.
    FeatureFlags(Vec<String>),
    /// One or more required permissions are not granted.
    Permissions(Vec<String>),
    /// A declared dependency has not reached `Loaded`.
    DependencyNotLoaded(String),
}

impl fmt::Display for UnmetCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmetCondition::FeatureFlags(flags) => {
                write!(f, "required feature flags not enabled: {}", flags.join(", "))
            }
            UnmetCondition::Permissions(perms) => {
                write!(f, "required permissions not granted: {}", perms.join(", "))
            }
            UnmetCondition::DependencyNotLoaded(dep) => {
                write!(f, "required dependency '{dep}' is not loaded")
            }
        }
    }
}

/// Validates a module's load condition against the access decider and the
/// status tracker.
pub struct ConditionValidator {
    status: Arc<StatusTracker>,
}

impl ConditionValidator {
    /// Create a validator reading dependency readiness from `status`.
    pub fn new(status: Arc<StatusTracker>) -> Self {
        Self { status }
    }

    /// Whether every named feature flag is enabled. Fails closed when no
    /// access decider is configured.
    pub async fn check_feature_flags(&self, flags: &[String], ctx: &BootstrapContext) -> bool {
        if flags.is_empty() {
            return true;
        }
        match ctx.access() {
            Some(decider) => decider.has_feature_flags(flags).await,
            None => {
                warn!(
                    flags = ?flags,
                    "no access decider configured, feature flag check fails closed"
                );
                false
            }
        }
    }

    /// Whether every named permission is granted. Fails closed when no
    /// access decider is configured.
    pub async fn check_permissions(&self, perms: &[String], ctx: &BootstrapContext) -> bool {
        if perms.is_empty() {
            return true;
        }
        match ctx.access() {
            Some(decider) => decider.has_permissions(perms).await,
            None => {
                warn!(
                    permissions = ?perms,
                    "no access decider configured, permission check fails closed"
                );
                false
            }
        }
    }

    /// Check every gate declared by the module: feature flags, permissions,
    /// and already-loaded dependencies.
    ///
    /// Dependency readiness only covers the already-loaded case here; actual
    /// loading of missing dependencies is the dependency resolver's job and
    /// runs before this check on the on-demand paths.
    pub async fn check_load_conditions(
        &self,
        module: &ModuleDescriptor,
        ctx: &BootstrapContext,
    ) -> Result<(), UnmetCondition> {
        let Some(condition) = module.condition() else {
            return Ok(());
        };

        if !self
            .check_feature_flags(&condition.feature_flags, ctx)
            .await
        {
            return Err(UnmetCondition::FeatureFlags(
                condition.feature_flags.clone(),
            ));
        }

        if !self
            .check_permissions(&condition.access_permissions, ctx)
            .await
        {
            return Err(UnmetCondition::Permissions(
                condition.access_permissions.clone(),
            ));
        }

        for dep in &condition.dependencies {
            if !self.status.is_loaded(dep) {
                return Err(UnmetCondition::DependencyNotLoaded(dep.clone()));
            }
        }

        Ok(())
    }
}
