//! Hook registry for storing and managing registered listeners.
//!
//! Listeners are kept per hook name, sorted ascending by priority. Ties keep
//! registration order. Listeners registered on behalf of a plugin carry the
//! plugin's full name so they can be dropped together when it is disabled.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::points::{HookPoint, available_hook_points};
use super::types::{HookListener, HookPriority, ListenerId};
use crate::config::PluginConfig;

/// Registered listener with metadata.
#[derive(Clone)]
pub(crate) struct Registration {
    pub id: ListenerId,
    pub owner: Option<String>,
    pub priority: HookPriority,
    pub listener: Arc<dyn HookListener>,
}

/// Registry and dispatcher for named hook points.
///
/// Constructed once at startup and shared as `Arc<HookManager>`.
pub struct HookManager {
    pub(crate) listeners: RwLock<HashMap<String, Vec<Registration>>>,
    next_id: AtomicU64,
    pub(crate) timeout: Option<Duration>,
}

impl HookManager {
    /// Create an empty manager with no per-listener timeout.
    pub fn new() -> Self {
        Self::with_timeout(None)
    }

    /// Create an empty manager bounding each listener call.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn from_config(config: &PluginConfig) -> Self {
        Self::with_timeout(config.hook_timeout())
    }

    /// Register a platform listener.
    pub async fn register(&self, listener: Arc<dyn HookListener>) -> ListenerId {
        let priority = listener.priority();
        self.insert(None, priority, listener).await
    }

    /// Register a listener owned by a plugin.
    ///
    /// Priorities in the system-reserved range are clamped to
    /// [`HookPriority::PLUGIN_MIN`].
    pub async fn register_owned(&self, owner: &str, listener: Arc<dyn HookListener>) -> ListenerId {
        let requested = listener.priority();
        let priority = HookPriority::new_for_plugin(requested.value());
        if priority != requested {
            warn!(
                plugin = owner,
                hook = listener.hook_name(),
                requested = requested.value(),
                "Reserved hook priority clamped for plugin listener"
            );
        }
        self.insert(Some(owner.to_string()), priority, listener).await
    }

    async fn insert(
        &self,
        owner: Option<String>,
        priority: HookPriority,
        listener: Arc<dyn HookListener>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let hook = listener.hook_name().to_string();

        let mut listeners = self.listeners.write().await;
        let entries = listeners.entry(hook.clone()).or_default();
        entries.push(Registration {
            id,
            owner,
            priority,
            listener,
        });
        entries.sort_by_key(|r| r.priority);

        debug!(hook = %hook, listener = %id, priority = priority.value(), "Hook listener registered");
        id
    }

    /// Remove every listener of a hook. Returns how many were removed.
    pub async fn unregister(&self, hook: &str) -> usize {
        self.listeners
            .write()
            .await
            .remove(hook)
            .map_or(0, |entries| entries.len())
    }

    /// Remove a single listener. Returns whether it was registered.
    pub async fn unregister_listener(&self, hook: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().await;
        let Some(entries) = listeners.get_mut(hook) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|r| r.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(hook);
        }
        removed
    }

    /// Remove every listener owned by a plugin. Returns how many were removed.
    pub async fn unregister_owner(&self, owner: &str) -> usize {
        let mut listeners = self.listeners.write().await;
        let mut removed = 0;

        for entries in listeners.values_mut() {
            let before = entries.len();
            entries.retain(|r| r.owner.as_deref() != Some(owner));
            removed += before - entries.len();
        }
        listeners.retain(|_, entries| !entries.is_empty());

        if removed > 0 {
            debug!(plugin = owner, removed, "Dropped plugin hook listeners");
        }
        removed
    }

    /// Hook names with at least one listener, sorted.
    pub async fn registered_hooks(&self) -> Vec<String> {
        let mut hooks: Vec<String> = self
            .listeners
            .read()
            .await
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(hook, _)| hook.clone())
            .collect();
        hooks.sort();
        hooks
    }

    /// The fixed catalog of well-known hook points.
    pub fn available_hook_points(&self) -> &'static [HookPoint] {
        available_hook_points()
    }

    pub async fn has_listeners(&self, hook: &str) -> bool {
        self.listener_count(hook).await > 0
    }

    pub async fn listener_count(&self, hook: &str) -> usize {
        self.listeners.read().await.get(hook).map_or(0, Vec::len)
    }

    /// Number of listeners owned by a plugin across all hooks.
    pub async fn owned_listener_count(&self, owner: &str) -> usize {
        self.listeners
            .read()
            .await
            .values()
            .flatten()
            .filter(|r| r.owner.as_deref() == Some(owner))
            .count()
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}
