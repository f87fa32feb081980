//! Plugin manifest definitions.
//!
//! The manifest file (`plugin.json`) declares a plugin's identity, version,
//! requested permissions and dependencies on other plugins. A manifest is
//! built once, validated, and never mutated afterwards.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::version::is_valid_version;
use crate::{PluginError, Result};

/// Plugin manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Publishing vendor (e.g., "acme")
    #[serde(default)]
    pub vendor: String,

    /// Plugin name, unique within the vendor
    #[serde(default)]
    pub name: String,

    /// Plugin version (`MAJOR.MINOR.PATCH` with optional suffix)
    #[serde(default)]
    pub version: String,

    /// Human-readable plugin name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Plugin description
    #[serde(default)]
    pub description: String,

    /// Plugin author
    #[serde(default)]
    pub author: Option<String>,

    /// Plugin license
    #[serde(default)]
    pub license: Option<String>,

    /// Plugin homepage/repository URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Entry point identifier
    #[serde(default)]
    pub entry_point: Option<String>,

    /// Requested capabilities
    #[serde(default)]
    pub permissions: BTreeSet<String>,

    /// Dependencies as `"vendor/name" -> constraint`
    #[serde(default, deserialize_with = "map_or_empty_array")]
    pub dependencies: BTreeMap<String, String>,

    /// Free-form data passed through untouched
    #[serde(default, deserialize_with = "map_or_empty_array")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PluginManifest {
    /// Load manifest from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse manifest from a JSON string.
    pub fn parse(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| {
            PluginError::invalid_manifest("unknown", format!("Failed to parse JSON: {}", e))
        })?;
        Self::from_value(value)
    }

    /// Build a manifest from a JSON mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if !value.is_object() {
            return Err(PluginError::invalid_manifest(
                "unknown",
                "Manifest must be a JSON object",
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| PluginError::invalid_manifest("unknown", e.to_string()))
    }

    /// Canonical `"vendor/name"` identifier.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.vendor, self.name)
    }

    /// Validate the manifest.
    pub fn validate(&self) -> Result<()> {
        let plugin = self.full_name();

        if self.vendor.is_empty() || self.name.is_empty() || self.version.is_empty() {
            return Err(PluginError::invalid_manifest(
                &plugin,
                "vendor, name and version are required",
            ));
        }

        for (field, value) in [("vendor", &self.vendor), ("name", &self.name)] {
            if !is_valid_identifier(value) {
                return Err(PluginError::invalid_manifest(
                    &plugin,
                    format!(
                        "{} can only contain alphanumeric characters, hyphens, and underscores",
                        field
                    ),
                ));
            }
        }

        if !is_valid_version(&self.version) {
            return Err(PluginError::invalid_manifest(
                &plugin,
                format!("Invalid version: {}", self.version),
            ));
        }

        Ok(())
    }

    /// Boolean form of [`validate`](Self::validate).
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Check if the plugin requests a specific permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Serialize all fields.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "vendor": self.vendor,
            "name": self.name,
            "version": self.version,
            "display_name": self.display_name,
            "description": self.description,
            "author": self.author,
            "license": self.license,
            "homepage": self.homepage,
            "entry_point": self.entry_point,
            "permissions": self.permissions,
            "dependencies": self.dependencies,
            "extra": self.extra,
        })
    }
}

/// Split a `"vendor/name"` key on its first `/`.
///
/// Returns `None` when the separator is missing or either segment is empty.
pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (vendor, name) = full_name.split_once('/')?;
    if vendor.is_empty() || name.is_empty() {
        return None;
    }
    Some((vendor, name))
}

/// Deserialize a map field, reading an empty JSON array as an empty map.
///
/// Some manifest writers encode an empty object as `[]`.
fn map_or_empty_array<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) if items.is_empty() => Ok(T::default()),
        other => T::deserialize(other).map_err(serde::de::Error::custom),
    }
}

fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
