//! Startup manifest parsing and validation.
//!
//! When modules are discovered remotely, the host fetches a JSON manifest
//! describing feature flags, permissions, free-form params, and the module
//! set. The kernel validates it before any descriptor is built: names must
//! be non-empty and unique, load types known, dependencies present and
//! acyclic, and remote entries well-formed locators. Fetching the manifest
//! itself is the host's concern.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use url::Url;

use crate::error::LoaderError;
use crate::module::{ConfigSlot, LoadCondition, LoadType, ModuleDescriptor};

/// Top-level startup manifest document.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupManifest {
    /// Whether the producing service considered the payload usable.
    pub status: ManifestStatus,
    /// The manifest payload.
    pub data: ManifestData,
}

/// Manifest payload status literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Ok,
    Error,
}

/// Manifest payload: capability maps, params, and the module set.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestData {
    /// Feature flag name -> enabled.
    #[serde(default)]
    pub features: HashMap<String, bool>,
    /// Permission name -> granted.
    #[serde(default)]
    pub permissions: HashMap<String, bool>,
    /// Free-form startup parameters, merged into the bootstrap context.
    #[serde(default)]
    pub params: JsonMap<String, JsonValue>,
    /// The module set to register.
    #[serde(default)]
    pub modules: Vec<ManifestModule>,
}

/// One module entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestModule {
    /// Unique module name.
    pub name: String,
    /// `"init"` or `"normal"`; lazy modules are declared in code, not the
    /// manifest.
    pub load_type: ManifestLoadType,
    /// Lower loads earlier among siblings.
    #[serde(default = "default_priority")]
    pub load_priority: i32,
    /// Locator of the remotely loaded bundle; empty for locally bundled
    /// modules.
    #[serde(default)]
    pub remote_entry: String,
    /// Modules that must load first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Feature flags that must all be enabled.
    #[serde(default)]
    pub feature_flags: Vec<String>,
    /// Permissions the acting principal must hold.
    #[serde(default)]
    pub access_permissions: Vec<String>,
}

fn default_priority() -> i32 {
    1
}

/// Manifest load type literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestLoadType {
    Init,
    Normal,
}

impl From<ManifestLoadType> for LoadType {
    fn from(value: ManifestLoadType) -> Self {
        match value {
            ManifestLoadType::Init => LoadType::Init,
            ManifestLoadType::Normal => LoadType::Normal,
        }
    }
}

impl StartupManifest {
    /// Parse a manifest from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, LoaderError> {
        serde_json::from_str(json).map_err(|e| LoaderError::InvalidManifest {
            details: e.to_string(),
        })
    }

    /// Validate the manifest: ok status, non-empty unique names, present
    /// acyclic dependencies, well-formed remote entries, and no gated init
    /// modules.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.status != ManifestStatus::Ok {
            return Err(invalid("manifest status is 'error'"));
        }

        let mut seen = HashSet::new();
        for module in &self.data.modules {
            if module.name.is_empty() {
                return Err(invalid("module with empty name"));
            }
            if !seen.insert(module.name.as_str()) {
                return Err(invalid(format!("duplicate module name '{}'", module.name)));
            }
            if !module.remote_entry.is_empty() && Url::parse(&module.remote_entry).is_err() {
                return Err(invalid(format!(
                    "module '{}' has malformed remoteEntry '{}'",
                    module.name, module.remote_entry
                )));
            }
            if module.load_type == ManifestLoadType::Init
                && (!module.dependencies.is_empty()
                    || !module.feature_flags.is_empty()
                    || !module.access_permissions.is_empty())
            {
                return Err(invalid(format!(
                    "init module '{}' must not declare load conditions",
                    module.name
                )));
            }
            for dep in &module.dependencies {
                if !self.data.modules.iter().any(|m| &m.name == dep) {
                    return Err(invalid(format!(
                        "module '{}' depends on '{dep}' which is not in the manifest",
                        module.name
                    )));
                }
            }
        }

        self.check_cycles()
    }

    /// Kahn's algorithm over the declared dependencies; any remainder after
    /// the queue drains is part of a cycle.
    fn check_cycles(&self) -> Result<(), LoaderError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for module in &self.data.modules {
            in_degree.entry(module.name.as_str()).or_insert(0);
            for dep in &module.dependencies {
                *in_degree.entry(module.name.as_str()).or_insert(0) += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(module.name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut settled = 0usize;

        while let Some(name) = queue.pop_front() {
            settled += 1;
            if let Some(deps) = dependents.get(name) {
                for &dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent);
                        }
                    }
                }
            }
        }

        if settled != self.data.modules.len() {
            let mut stuck: Vec<&str> = self
                .data
                .modules
                .iter()
                .map(|m| m.name.as_str())
                .filter(|name| in_degree.get(name).is_some_and(|&d| d > 0))
                .collect();
            stuck.sort_unstable();
            return Err(invalid(format!(
                "circular dependency involving: {}",
                stuck.join(", ")
            )));
        }
        Ok(())
    }
}

impl ManifestModule {
    /// Build a descriptor from this entry, with the given config slot
    /// (deferred for remote entries, resolved for locally bundled modules).
    pub fn to_descriptor(&self, config: ConfigSlot) -> ModuleDescriptor {
        let mut descriptor = ModuleDescriptor::from_parts(
            self.name.clone(),
            self.load_type.into(),
            config,
        )
        .with_priority(self.load_priority);

        let condition = LoadCondition {
            feature_flags: self.feature_flags.clone(),
            access_permissions: self.access_permissions.clone(),
            dependencies: self.dependencies.clone(),
        };
        if !condition.is_empty() {
            descriptor = descriptor.with_condition(condition);
        }
        descriptor
    }
}

fn invalid(details: impl Into<String>) -> LoaderError {
    LoaderError::InvalidManifest {
        details: details.into(),
    }
}
