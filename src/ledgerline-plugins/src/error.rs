//! Plugin system error types.

use thiserror::Error;

/// Plugin system errors.
///
/// Expected business rejections (name collisions, unmet dependencies,
/// invalid state transitions) are reported through
/// [`Outcome`](crate::manager::Outcome) instead of this type.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Plugin not found.
    #[error("Plugin not found: {0}")]
    NotFound(String),

    /// Plugin already exists.
    #[error("Plugin already exists: {0}")]
    AlreadyExists(String),

    /// Invalid plugin manifest.
    #[error("Invalid manifest for plugin '{plugin}': {message}")]
    InvalidManifest { plugin: String, message: String },

    /// Plugin boot error.
    #[error("Failed to boot plugin '{plugin}': {message}")]
    BootError { plugin: String, message: String },

    /// Permission denied by the sandbox. Never retryable.
    #[error("Permission denied: plugin '{plugin}' lacks '{permission}'")]
    PermissionDenied { plugin: String, permission: String },

    /// Hook listener error.
    #[error("Hook error in '{hook}': {message}")]
    HookError { hook: String, message: String },

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error.
    #[error("Plugin operation timed out: {0}")]
    Timeout(String),
}

impl PluginError {
    /// Create an invalid manifest error.
    pub fn invalid_manifest(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a boot error.
    pub fn boot_error(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BootError {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(plugin: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            plugin: plugin.into(),
            permission: permission.into(),
        }
    }

    /// Create a hook error.
    pub fn hook_error(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookError {
            hook: hook.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IoError(_) | Self::Storage(_) | Self::Timeout(_))
    }
}

impl From<toml::de::Error> for PluginError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type alias for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;
