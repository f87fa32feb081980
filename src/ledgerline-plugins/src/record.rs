//! Persistent plugin records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::manifest::PluginManifest;

/// Plugin lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Installed but not running
    #[default]
    Inactive,
    /// Enabled and booted
    Active,
    /// Boot failed while active
    Failed,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An installed plugin as stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Publishing vendor
    pub vendor: String,

    /// Plugin name
    pub name: String,

    /// Installed version
    pub version: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: PluginStatus,

    /// System plugins cannot be removed
    #[serde(default)]
    pub is_system: bool,

    /// Declared permissions
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Declared dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Installation path
    pub path: PathBuf,

    /// Entry point identifier
    #[serde(default)]
    pub entry_point: Option<String>,

    pub installed_at: DateTime<Utc>,

    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl PluginRecord {
    /// Create an inactive record from a manifest.
    pub fn from_manifest(manifest: &PluginManifest, path: PathBuf) -> Self {
        Self {
            vendor: manifest.vendor.clone(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            display_name: manifest.display_name.clone(),
            description: manifest.description.clone(),
            status: PluginStatus::Inactive,
            is_system: false,
            permissions: manifest.permissions.clone(),
            dependencies: manifest.dependencies.clone(),
            path,
            entry_point: manifest.entry_point.clone(),
            installed_at: Utc::now(),
            activated_at: None,
            last_updated_at: None,
        }
    }

    /// Mark as a protected system plugin.
    pub fn with_system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    /// Canonical `"vendor/name"` identifier.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }

    pub fn is_active(&self) -> bool {
        self.status == PluginStatus::Active
    }

    /// Check if the plugin declared a permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
