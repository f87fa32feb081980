//! Plugin manager - the main interface for the plugin system.
//!
//! Lifecycle per plugin:
//!
//! ```text
//! absent -> inactive -> active <-> inactive -> removed
//!                          \-> failed (boot failure)
//! ```
//!
//! Expected rejections (duplicates, invalid manifests, unmet dependencies,
//! invalid transitions) come back as an unsuccessful [`Outcome`]. Only
//! repository and I/O failures are errors.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::config::PluginConfig;
use crate::hooks::{self, HookManager};
use crate::loader::{
    BootOutcome, BootReport, EntryPointRegistry, HookHost, PluginHost, PluginLoader,
};
use crate::manifest::PluginManifest;
use crate::record::{PluginRecord, PluginStatus};
use crate::repository::PluginRepository;
use crate::resolver::{DependencyResolver, Resolution};
use crate::sandbox::Sandbox;
use crate::{PluginError, Result};

/// Result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Counts from syncing the plugins directory into the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverSummary {
    /// Valid manifests found on disk
    pub discovered: usize,
    /// Manifests installed by this sync
    pub new: usize,
    /// Manifests not yet installed whose install was rejected, with reasons
    pub rejected: Vec<String>,
}

/// What [`PluginManager::boot`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Present when auto-discovery ran
    pub discovery: Option<DiscoverSummary>,
    pub boot: BootReport,
}

/// Serializes check-then-write sequences per plugin full name.
///
/// Entries live only while some task holds or waits on the key.
#[derive(Default)]
struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = Arc::clone(self.entries().entry(key.to_string()).or_default());
        KeyGuard {
            owner: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Holds one key of a [`KeyedLocks`] until dropped.
struct KeyGuard<'a> {
    owner: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut entries = self.owner.entries();
        // Waiters hold their own clone of the Arc.
        if entries
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(&self.key);
        }
    }
}

/// Plugin manager - the main entry point for the plugin system.
///
/// The manager handles:
/// - Installation gated by dependency resolution
/// - Lifecycle transitions (enable, disable, update, remove)
/// - Booting through the loader
/// - Directory discovery
pub struct PluginManager {
    /// Configuration
    config: PluginConfig,

    /// Persistent plugin records
    repository: Arc<dyn PluginRepository>,

    resolver: DependencyResolver,

    /// Plugin loader
    loader: PluginLoader,

    /// Hook registry
    hooks: Arc<HookManager>,

    sandbox: Sandbox,

    locks: KeyedLocks,
}

impl PluginManager {
    /// Create a manager that boots plugins into `hooks`.
    pub fn new(
        config: PluginConfig,
        repository: Arc<dyn PluginRepository>,
        hooks: Arc<HookManager>,
        entry_points: EntryPointRegistry,
    ) -> Self {
        let sandbox = Sandbox::from_config(&config);
        let host = Arc::new(HookHost::new(Arc::clone(&hooks), sandbox));
        Self::with_host(config, repository, hooks, entry_points, host)
    }

    /// Create a manager with a custom plugin host.
    pub fn with_host(
        config: PluginConfig,
        repository: Arc<dyn PluginRepository>,
        hooks: Arc<HookManager>,
        entry_points: EntryPointRegistry,
        host: Arc<dyn PluginHost>,
    ) -> Self {
        let sandbox = Sandbox::from_config(&config);
        let resolver = DependencyResolver::new(Arc::clone(&repository));
        let loader = PluginLoader::new(
            config.clone(),
            Arc::clone(&repository),
            Arc::new(entry_points),
            host,
        );

        Self {
            config,
            repository,
            resolver,
            loader,
            hooks,
            sandbox,
            locks: KeyedLocks::default(),
        }
    }

    // ========== Lifecycle ==========

    /// Install a plugin from its manifest. The new record is inactive.
    pub async fn install(&self, manifest: &PluginManifest) -> Result<Outcome> {
        let full_name = manifest.full_name();
        let guard = self.locks.acquire(&full_name).await;

        if self
            .repository
            .exists(&manifest.vendor, &manifest.name)
            .await?
        {
            return Ok(Outcome::rejected(format!(
                "Plugin {} is already installed",
                full_name
            )));
        }

        if let Err(e) = manifest.validate() {
            return Ok(Outcome::rejected(e.to_string()));
        }

        let resolution = self.resolver.resolve(manifest).await?;
        if !resolution.satisfied {
            return Ok(Outcome::rejected(rejection_reasons(&resolution)));
        }

        let path = self.config.plugin_path(&manifest.vendor, &manifest.name);
        let record = PluginRecord::from_manifest(manifest, path);
        match self.repository.create(record).await {
            Ok(()) => {}
            Err(PluginError::AlreadyExists(_)) => {
                return Ok(Outcome::rejected(format!(
                    "Plugin {} is already installed",
                    full_name
                )));
            }
            Err(e) => return Err(e),
        }

        info!(plugin = %full_name, version = %manifest.version, "Plugin installed");
        drop(guard);
        self.announce(hooks::PLUGIN_INSTALLED, &full_name, &manifest.version)
            .await;
        Ok(Outcome::ok(format!("Plugin {} installed", full_name)))
    }

    /// Remove a plugin, disabling it first if active.
    pub async fn remove(&self, vendor: &str, name: &str) -> Result<Outcome> {
        let full_name = format!("{}/{}", vendor, name);
        let guard = self.locks.acquire(&full_name).await;

        let Some(record) = self.repository.find(vendor, name).await? else {
            return Ok(not_installed(&full_name));
        };

        if record.is_system {
            return Ok(Outcome::rejected(format!(
                "Plugin {} is a system plugin and cannot be removed",
                full_name
            )));
        }

        if record.is_active() {
            self.deactivate(record.clone()).await?;
        }
        self.hooks.unregister_owner(&full_name).await;
        self.repository.delete(vendor, name).await?;

        info!(plugin = %full_name, "Plugin removed");
        drop(guard);
        self.announce(hooks::PLUGIN_REMOVED, &full_name, &record.version)
            .await;
        Ok(Outcome::ok(format!("Plugin {} removed", full_name)))
    }

    /// Activate a plugin and boot it.
    ///
    /// Succeeds once the activation is persisted, even if booting then
    /// fails; the record shows `failed` in that case.
    pub async fn enable(&self, vendor: &str, name: &str) -> Result<Outcome> {
        let full_name = format!("{}/{}", vendor, name);
        let guard = self.locks.acquire(&full_name).await;

        let Some(mut record) = self.repository.find(vendor, name).await? else {
            return Ok(not_installed(&full_name));
        };

        if record.is_active() {
            return Ok(Outcome::rejected(format!(
                "Plugin {} is already active",
                full_name
            )));
        }

        record.status = PluginStatus::Active;
        record.activated_at = Some(Utc::now());
        self.repository.update(&record).await?;
        info!(plugin = %full_name, "Plugin enabled");

        let message = match self.loader.boot_plugin(&record).await? {
            BootOutcome::Booted => format!("Plugin {} enabled", full_name),
            BootOutcome::MissingEntryPoint(identifier) => format!(
                "Plugin {} enabled (no entry point registered for {})",
                full_name, identifier
            ),
            BootOutcome::Failed(reason) => {
                format!("Plugin {} enabled but failed to boot: {}", full_name, reason)
            }
        };

        drop(guard);
        self.announce(hooks::PLUGIN_ENABLED, &full_name, &record.version)
            .await;
        Ok(Outcome::ok(message))
    }

    /// Deactivate a plugin and drop its hook listeners.
    pub async fn disable(&self, vendor: &str, name: &str) -> Result<Outcome> {
        let full_name = format!("{}/{}", vendor, name);
        let guard = self.locks.acquire(&full_name).await;

        let Some(record) = self.repository.find(vendor, name).await? else {
            return Ok(not_installed(&full_name));
        };

        if record.status == PluginStatus::Inactive {
            return Ok(Outcome::rejected(format!(
                "Plugin {} is already inactive",
                full_name
            )));
        }

        let version = record.version.clone();
        self.deactivate(record).await?;

        info!(plugin = %full_name, "Plugin disabled");
        drop(guard);
        self.announce(hooks::PLUGIN_DISABLED, &full_name, &version)
            .await;
        Ok(Outcome::ok(format!("Plugin {} disabled", full_name)))
    }

    /// Replace an installed plugin's manifest data.
    ///
    /// Dependents are not re-resolved against the new version.
    pub async fn update(
        &self,
        vendor: &str,
        name: &str,
        manifest: &PluginManifest,
    ) -> Result<Outcome> {
        let full_name = format!("{}/{}", vendor, name);
        let _guard = self.locks.acquire(&full_name).await;

        let Some(mut record) = self.repository.find(vendor, name).await? else {
            return Ok(not_installed(&full_name));
        };

        if let Err(e) = manifest.validate() {
            return Ok(Outcome::rejected(e.to_string()));
        }

        if manifest.vendor != vendor || manifest.name != name {
            return Ok(Outcome::rejected(format!(
                "Manifest is for {}, not {}",
                manifest.full_name(),
                full_name
            )));
        }

        let previous = std::mem::replace(&mut record.version, manifest.version.clone());
        record.display_name = manifest.display_name.clone();
        record.description = manifest.description.clone();
        record.permissions = manifest.permissions.clone();
        record.dependencies = manifest.dependencies.clone();
        record.entry_point = manifest.entry_point.clone();
        record.last_updated_at = Some(Utc::now());
        self.repository.update(&record).await?;

        info!(plugin = %full_name, from = %previous, to = %record.version, "Plugin updated");
        Ok(Outcome::ok(format!(
            "Plugin {} updated to {}",
            full_name, record.version
        )))
    }

    // ========== Queries ==========

    /// All installed plugins ordered by vendor, then name.
    pub async fn list(&self) -> Result<Vec<PluginRecord>> {
        let mut records = self.repository.list().await?;
        records.sort_by(|a, b| (&a.vendor, &a.name).cmp(&(&b.vendor, &b.name)));
        Ok(records)
    }

    /// Look up a single installed plugin.
    pub async fn get(&self, vendor: &str, name: &str) -> Result<Option<PluginRecord>> {
        self.repository.find(vendor, name).await
    }

    /// Resolve a manifest's dependencies without installing it.
    pub async fn resolve(&self, manifest: &PluginManifest) -> Result<Resolution> {
        self.resolver.resolve(manifest).await
    }

    // ========== Discovery and Startup ==========

    /// Install every valid manifest on disk that is not yet a record.
    pub async fn discover(&self) -> Result<DiscoverSummary> {
        let found = self.loader.discover().await;
        let mut summary = DiscoverSummary {
            discovered: found.len(),
            ..Default::default()
        };

        for (full_name, plugin) in found {
            if self
                .repository
                .exists(&plugin.manifest.vendor, &plugin.manifest.name)
                .await?
            {
                debug!(plugin = %full_name, "Already installed");
                continue;
            }

            let outcome = self.install(&plugin.manifest).await?;
            if outcome.success {
                summary.new += 1;
            } else {
                summary
                    .rejected
                    .push(format!("{}: {}", full_name, outcome.message));
            }
        }

        info!(
            discovered = summary.discovered,
            new = summary.new,
            rejected = summary.rejected.len(),
            "Plugin discovery complete"
        );
        Ok(summary)
    }

    /// Startup: discover when configured to, then boot active plugins.
    pub async fn boot(&self) -> Result<StartupReport> {
        let discovery = if self.config.auto_discover {
            Some(self.discover().await?)
        } else {
            None
        };

        let boot = self.loader.boot_active_plugins().await?;
        Ok(StartupReport { discovery, boot })
    }

    // ========== Accessors ==========

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn hooks(&self) -> &Arc<HookManager> {
        &self.hooks
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn repository(&self) -> &Arc<dyn PluginRepository> {
        &self.repository
    }

    // ========== Internals ==========

    // Caller holds the plugin's lock.
    async fn deactivate(&self, mut record: PluginRecord) -> Result<()> {
        record.status = PluginStatus::Inactive;
        record.activated_at = None;
        self.repository.update(&record).await?;
        self.hooks.unregister_owner(&record.full_name()).await;
        Ok(())
    }

    // Callers drop their key lock first; listeners may call back into the manager.
    async fn announce(&self, hook: &str, full_name: &str, version: &str) {
        let payload = json!({ "plugin": full_name, "version": version });
        self.hooks.dispatch(hook, &payload).await;
    }
}

fn not_installed(full_name: &str) -> Outcome {
    Outcome::rejected(format!("Plugin {} is not installed", full_name))
}

fn rejection_reasons(resolution: &Resolution) -> String {
    let mut reasons = Vec::new();
    if !resolution.missing.is_empty() {
        reasons.push(format!(
            "Missing dependencies: {}",
            resolution.missing.join(", ")
        ));
    }
    if resolution.circular {
        reasons.push("Circular dependency detected".to_string());
    }
    reasons.join("; ")
}
