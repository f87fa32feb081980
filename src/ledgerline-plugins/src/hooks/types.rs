//! Core hook types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Hook priority - lower values run first.
///
/// # Security
///
/// Priorities below [`PLUGIN_MIN`](Self::PLUGIN_MIN) run before any
/// third-party code and are reserved for the platform itself.
///
/// | Range   | Usage                     | Who Can Use            |
/// |---------|---------------------------|------------------------|
/// | 0-9     | Critical platform hooks   | Core platform only     |
/// | 10-49   | System-level hooks        | System plugins         |
/// | 50-99   | High priority plugins     | Third-party (high)     |
/// | 100-174 | Normal priority plugins   | Third-party (normal)   |
/// | 175-255 | Low priority plugins      | Third-party (low)      |
///
/// Listeners registered on behalf of a plugin are clamped to `PLUGIN_MIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HookPriority(pub i32);

impl Default for HookPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl HookPriority {
    /// Critical platform priority (runs first).
    pub const SYSTEM_CRITICAL: Self = Self(0);

    /// System priority.
    pub const SYSTEM: Self = Self(10);

    /// High system priority.
    pub const SYSTEM_HIGH: Self = Self(25);

    /// Minimum priority allowed for plugin-owned listeners.
    pub const PLUGIN_MIN: Self = Self(50);

    /// High priority for plugins (runs early, but after system listeners).
    pub const PLUGIN_HIGH: Self = Self(75);

    /// Normal priority (default).
    pub const NORMAL: Self = Self(100);

    /// Low priority (runs later).
    pub const LOW: Self = Self(175);

    /// Lowest priority (runs last).
    pub const LOWEST: Self = Self(255);

    /// Get the raw priority value.
    pub fn value(&self) -> i32 {
        self.0
    }

    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Priority clamped to the plugin range.
    pub fn new_for_plugin(value: i32) -> Self {
        Self(value.max(Self::PLUGIN_MIN.0))
    }

    /// Check if this priority is in the system-reserved range.
    pub fn is_system_reserved(&self) -> bool {
        self.0 < Self::PLUGIN_MIN.0
    }
}

impl fmt::Display for HookPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by registration, used to remove a single listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A listener attached to a named hook point.
#[async_trait]
pub trait HookListener: Send + Sync {
    /// Hook point this listener subscribes to.
    fn hook_name(&self) -> &str;

    /// Get the priority of this listener.
    fn priority(&self) -> HookPriority {
        HookPriority::default()
    }

    /// Handle a dispatched payload.
    async fn handle(&self, payload: &serde_json::Value) -> Result<()>;
}

/// Counters from one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Listeners invoked
    pub invoked: usize,
    /// Listeners that returned an error, panicked or timed out
    pub failed: usize,
}

impl DispatchSummary {
    pub fn succeeded(&self) -> usize {
        self.invoked - self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(HookPriority::SYSTEM < HookPriority::PLUGIN_MIN);
        assert!(HookPriority::NORMAL < HookPriority::LOW);
        assert_eq!(HookPriority::default(), HookPriority::NORMAL);
    }

    #[test]
    fn test_plugin_priority_clamp() {
        assert_eq!(HookPriority::new_for_plugin(5), HookPriority::PLUGIN_MIN);
        assert_eq!(HookPriority::new_for_plugin(120).value(), 120);
        assert!(HookPriority::new(5).is_system_reserved());
        assert!(!HookPriority::LOWEST.is_system_reserved());
    }

    #[test]
    fn test_summary() {
        let summary = DispatchSummary {
            invoked: 3,
            failed: 1,
        };
        assert_eq!(summary.succeeded(), 2);
    }
}
