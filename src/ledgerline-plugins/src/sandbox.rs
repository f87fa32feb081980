//! Capability guard for running plugins.
//!
//! A plugin may use a capability only if it declared the matching
//! permission in its manifest. With sandboxing disabled every check passes.

use serde::Serialize;
use tracing::warn;

use crate::config::PluginConfig;
use crate::permissions;
use crate::record::PluginRecord;
use crate::{PluginError, Result};

/// Declared permissions checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionValidation {
    pub valid: bool,
    /// Declared permissions missing from the catalog
    pub unrecognized: Vec<String>,
}

/// Runtime permission guard.
#[derive(Debug, Clone, Copy)]
pub struct Sandbox {
    enabled: bool,
}

impl Sandbox {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::new(config.sandbox_enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check whether a plugin holds a permission.
    pub fn has_permission(&self, plugin: &PluginRecord, permission: &str) -> bool {
        !self.enabled || plugin.has_permission(permission)
    }

    /// Fail with `PermissionDenied` unless the plugin holds the permission.
    pub fn enforce(&self, plugin: &PluginRecord, permission: &str) -> Result<()> {
        if self.has_permission(plugin, permission) {
            return Ok(());
        }

        warn!(
            plugin = %plugin.full_name(),
            permission,
            "Sandbox denied capability"
        );
        Err(PluginError::permission_denied(plugin.full_name(), permission))
    }

    /// All-of check over several permissions.
    pub fn can_access(&self, plugin: &PluginRecord, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.has_permission(plugin, p))
    }

    /// The subset of `permissions` the plugin is not granted.
    pub fn missing_permissions(&self, plugin: &PluginRecord, permissions: &[&str]) -> Vec<String> {
        permissions
            .iter()
            .filter(|p| !self.has_permission(plugin, p))
            .map(|p| p.to_string())
            .collect()
    }

    /// Cross-check the plugin's declared permissions against the catalog.
    pub fn validate_permissions(&self, plugin: &PluginRecord) -> PermissionValidation {
        let check = permissions::validate(&plugin.permissions);
        PermissionValidation {
            valid: check.valid,
            unrecognized: check.invalid,
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(true)
    }
}
