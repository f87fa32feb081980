//! Plugin system configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{PLUGIN_DIR, Result};

/// Environment variable overriding [`PluginConfig::plugins_dir`].
pub const ENV_PLUGINS_DIR: &str = "LEDGERLINE_PLUGINS_DIR";

/// Environment variable overriding [`PluginConfig::sandbox_enabled`].
pub const ENV_SANDBOX: &str = "LEDGERLINE_SANDBOX";

/// Plugin system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Root of the `{vendor}/{plugin}` tree
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Whether sandbox permission checks are enforced
    #[serde(default = "default_true")]
    pub sandbox_enabled: bool,

    /// Whether to run discovery when the runtime boots
    #[serde(default)]
    pub auto_discover: bool,

    /// Per-listener dispatch timeout (in milliseconds, 0 disables)
    #[serde(default = "default_hook_timeout_ms")]
    pub hook_timeout_ms: u64,

    /// File extensions the security scanner treats as source files
    #[serde(default = "default_scan_extensions")]
    pub scan_extensions: Vec<String>,

    /// Location of the JSON plugin repository
    #[serde(default = "default_repository_path")]
    pub repository_path: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            sandbox_enabled: true,
            auto_discover: false,
            hook_timeout_ms: default_hook_timeout_ms(),
            scan_extensions: default_scan_extensions(),
            repository_path: default_repository_path(),
        }
    }
}

impl PluginConfig {
    /// Create a configuration rooted at a specific plugins directory.
    pub fn with_plugins_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: path.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `LEDGERLINE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_PLUGINS_DIR).ok(),
            std::env::var(ENV_SANDBOX).ok(),
        )
    }

    fn with_overrides(mut self, plugins_dir: Option<String>, sandbox: Option<String>) -> Self {
        if let Some(dir) = plugins_dir.filter(|d| !d.is_empty()) {
            self.plugins_dir = PathBuf::from(dir);
        }

        if let Some(flag) = sandbox {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.sandbox_enabled = true,
                "0" | "false" | "off" | "no" => self.sandbox_enabled = false,
                other => tracing::warn!("Ignoring unrecognized {}={}", ENV_SANDBOX, other),
            }
        }

        self
    }

    /// Install directory for a plugin.
    pub fn plugin_path(&self, vendor: &str, name: &str) -> PathBuf {
        self.plugins_dir.join(vendor).join(name)
    }

    /// Per-listener dispatch timeout, if any.
    pub fn hook_timeout(&self) -> Option<std::time::Duration> {
        (self.hook_timeout_ms > 0).then(|| std::time::Duration::from_millis(self.hook_timeout_ms))
    }
}

fn default_plugins_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ledgerline").join(PLUGIN_DIR))
        .unwrap_or_else(|| PathBuf::from(PLUGIN_DIR))
}

fn default_repository_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ledgerline").join("plugins.json"))
        .unwrap_or_else(|| PathBuf::from("plugins.json"))
}

fn default_scan_extensions() -> Vec<String> {
    ["php", "phtml", "inc", "js", "ts", "py", "rb", "sh", "rs"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

fn default_hook_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}
