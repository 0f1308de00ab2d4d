//! Runtime configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default per-module init hook timeout in milliseconds.
const DEFAULT_INIT_TIMEOUT_MS: u64 = 30_000;

/// Kernel runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Base URL of the backing API (default: `http://localhost:3000`).
    pub api_base_url: String,

    /// Per-module init hook timeout. `None` disables the timeout; a hung
    /// init hook then hangs its level indefinitely.
    pub init_timeout: Option<Duration>,

    /// Module names to force-disable (from `STAGEHAND_DISABLED_MODULES`).
    /// Disabled modules are dropped before registration.
    pub disabled_modules: Vec<String>,

    /// Whether module-provided mock handlers are registered during
    /// activation (development only, default off).
    pub enable_mock_handlers: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            init_timeout: Some(Duration::from_millis(DEFAULT_INIT_TIMEOUT_MS)),
            disabled_modules: Vec::new(),
            enable_mock_handlers: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_base_url =
            env::var("STAGEHAND_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let init_timeout_ms: u64 = env::var("STAGEHAND_INIT_TIMEOUT_MS")
            .unwrap_or_else(|_| DEFAULT_INIT_TIMEOUT_MS.to_string())
            .parse()
            .context("STAGEHAND_INIT_TIMEOUT_MS must be a valid u64")?;
        // 0 disables the timeout
        let init_timeout = (init_timeout_ms > 0).then(|| Duration::from_millis(init_timeout_ms));

        let disabled_modules = env::var("STAGEHAND_DISABLED_MODULES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let enable_mock_handlers = env::var("STAGEHAND_ENABLE_MOCKS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            api_base_url,
            init_timeout,
            disabled_modules,
            enable_mock_handlers,
        })
    }

    /// Whether the named module is force-disabled by configuration.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_modules.iter().any(|d| d == name)
    }
}
