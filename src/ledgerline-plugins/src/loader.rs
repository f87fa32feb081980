//! Plugin loader for discovering manifests and booting entry points.
//!
//! Plugins live at `{plugins_dir}/{vendor}/{plugin}/plugin.json`. Booting
//! never uses reflection: each entry point is looked up by identifier in an
//! [`EntryPointRegistry`] filled in at startup, and the produced
//! [`PluginBootstrap`] is handed to a [`PluginHost`].

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::PluginConfig;
use crate::hooks::{HookListener, HookManager, ListenerId};
use crate::manifest::PluginManifest;
use crate::permissions::HOOKS_REGISTER;
use crate::record::{PluginRecord, PluginStatus};
use crate::repository::PluginRepository;
use crate::sandbox::Sandbox;
use crate::{MANIFEST_FILE, Result};

/// Entry point used when a manifest does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "Plugin";

/// Discovered plugin information.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Plugin manifest
    pub manifest: PluginManifest,
    /// Plugin directory path
    pub path: PathBuf,
}

impl DiscoveredPlugin {
    pub fn full_name(&self) -> String {
        self.manifest.full_name()
    }

    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

/// A plugin's code unit.
#[async_trait]
pub trait PluginBootstrap: Send + Sync {
    /// Attach the plugin's listeners and services.
    async fn boot(&self, ctx: &BootContext) -> Result<()>;
}

/// Builds a plugin's code unit from its record.
pub type EntryPointFactory =
    Arc<dyn Fn(&PluginRecord) -> Result<Box<dyn PluginBootstrap>> + Send + Sync>;

/// Explicit identifier-to-factory table for plugin entry points.
#[derive(Default, Clone)]
pub struct EntryPointRegistry {
    factories: HashMap<String, EntryPointFactory>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a fully qualified identifier
    /// (`vendor::name::EntryPoint`).
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn(&PluginRecord) -> Result<Box<dyn PluginBootstrap>> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        if self.factories.insert(identifier.clone(), Arc::new(factory)).is_some() {
            warn!(entry_point = %identifier, "Entry point factory replaced");
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PluginRecord) -> Result<Box<dyn PluginBootstrap>> + Send + Sync + 'static,
    {
        self.register(identifier, factory);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<&EntryPointFactory> {
        self.factories.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// Resolve the entry-point identifier of a record.
///
/// Identifiers that already contain `::` are used as-is; anything else is
/// qualified as `vendor::name::EntryPoint`.
pub fn entry_point_identifier(record: &PluginRecord) -> String {
    let entry_point = record
        .entry_point
        .as_deref()
        .map(str::trim)
        .filter(|ep| !ep.is_empty())
        .unwrap_or(DEFAULT_ENTRY_POINT);

    if entry_point.contains("::") {
        entry_point.to_string()
    } else {
        format!("{}::{}::{}", record.vendor, record.name, entry_point)
    }
}

/// The host side of booting: accepts a plugin's code unit.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Register a plugin's code unit with the host.
    async fn register(&self, record: &PluginRecord, unit: Box<dyn PluginBootstrap>) -> Result<()>;
}

/// Capabilities handed to a plugin while it boots.
pub struct BootContext {
    plugin: PluginRecord,
    hooks: Arc<HookManager>,
    sandbox: Sandbox,
}

impl BootContext {
    pub fn new(plugin: PluginRecord, hooks: Arc<HookManager>, sandbox: Sandbox) -> Self {
        Self {
            plugin,
            hooks,
            sandbox,
        }
    }

    /// The booting plugin.
    pub fn plugin(&self) -> &PluginRecord {
        &self.plugin
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Attach a listener owned by the booting plugin.
    ///
    /// Requires the `hooks.register` permission.
    pub async fn register_listener(&self, listener: Arc<dyn HookListener>) -> Result<ListenerId> {
        self.sandbox.enforce(&self.plugin, HOOKS_REGISTER)?;
        Ok(self
            .hooks
            .register_owned(&self.plugin.full_name(), listener)
            .await)
    }
}

/// Default host: boots each unit against the shared hook manager.
///
/// If a unit fails to boot, listeners it already attached are removed.
pub struct HookHost {
    hooks: Arc<HookManager>,
    sandbox: Sandbox,
}

impl HookHost {
    pub fn new(hooks: Arc<HookManager>, sandbox: Sandbox) -> Self {
        Self { hooks, sandbox }
    }
}

#[async_trait]
impl PluginHost for HookHost {
    async fn register(&self, record: &PluginRecord, unit: Box<dyn PluginBootstrap>) -> Result<()> {
        let ctx = BootContext::new(record.clone(), Arc::clone(&self.hooks), self.sandbox);
        if let Err(e) = unit.boot(&ctx).await {
            self.hooks.unregister_owner(&record.full_name()).await;
            return Err(e);
        }
        Ok(())
    }
}

/// What happened when booting one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    Booted,
    /// No factory is registered for the identifier
    MissingEntryPoint(String),
    /// The factory or the host failed; the record is now `failed`
    Failed(String),
}

/// Counters from booting every active plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootReport {
    pub booted: usize,
    pub missing: usize,
    pub failed: usize,
}

/// Plugin loader for discovering and booting plugins.
pub struct PluginLoader {
    config: PluginConfig,
    repository: Arc<dyn PluginRepository>,
    entry_points: Arc<EntryPointRegistry>,
    host: Arc<dyn PluginHost>,
}

impl PluginLoader {
    /// Create a new plugin loader.
    pub fn new(
        config: PluginConfig,
        repository: Arc<dyn PluginRepository>,
        entry_points: Arc<EntryPointRegistry>,
        host: Arc<dyn PluginHost>,
    ) -> Self {
        Self {
            config,
            repository,
            entry_points,
            host,
        }
    }

    /// Discover valid manifests under the plugins directory, keyed by full name.
    ///
    /// Unreadable directories and invalid manifests are logged and skipped.
    pub async fn discover(&self) -> BTreeMap<String, DiscoveredPlugin> {
        let mut plugins: BTreeMap<String, DiscoveredPlugin> = BTreeMap::new();
        let root = &self.config.plugins_dir;

        if !root.exists() {
            debug!(path = %root.display(), "Plugin directory does not exist");
            return plugins;
        }

        let vendors = match list_dirs(root).await {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Error reading plugin directory");
                return plugins;
            }
        };

        for vendor_dir in vendors {
            let plugin_dirs = match list_dirs(&vendor_dir).await {
                Ok(dirs) => dirs,
                Err(e) => {
                    warn!(path = %vendor_dir.display(), error = %e, "Error reading vendor directory");
                    continue;
                }
            };

            for plugin_dir in plugin_dirs {
                let manifest_path = plugin_dir.join(MANIFEST_FILE);
                if !manifest_path.exists() {
                    continue;
                }

                let manifest = match load_manifest(&manifest_path).await {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        warn!(path = %manifest_path.display(), error = %e, "Failed to load manifest");
                        continue;
                    }
                };

                if let Err(e) = manifest.validate() {
                    warn!(path = %manifest_path.display(), error = %e, "Invalid manifest");
                    continue;
                }

                let full_name = manifest.full_name();
                if let Some(existing) = plugins.get(&full_name) {
                    warn!(
                        plugin = %full_name,
                        path = %plugin_dir.display(),
                        kept = %existing.path.display(),
                        "Duplicate plugin manifest ignored"
                    );
                    continue;
                }

                plugins.insert(
                    full_name,
                    DiscoveredPlugin {
                        manifest,
                        path: plugin_dir,
                    },
                );
            }
        }

        info!(count = plugins.len(), "Discovered plugins");
        plugins
    }

    /// Boot every persisted plugin with active status.
    pub async fn boot_active_plugins(&self) -> Result<BootReport> {
        let mut report = BootReport::default();

        for record in self.repository.find_by_status(PluginStatus::Active).await? {
            match self.boot_plugin(&record).await? {
                BootOutcome::Booted => report.booted += 1,
                BootOutcome::MissingEntryPoint(_) => report.missing += 1,
                BootOutcome::Failed(_) => report.failed += 1,
            }
        }

        info!(
            booted = report.booted,
            missing = report.missing,
            failed = report.failed,
            "Booted active plugins"
        );
        Ok(report)
    }

    /// Boot one plugin.
    ///
    /// A missing entry point is logged and left alone. A factory or host
    /// failure is logged and persisted as `failed`. Only repository errors
    /// are returned as `Err`.
    pub async fn boot_plugin(&self, record: &PluginRecord) -> Result<BootOutcome> {
        let plugin = record.full_name();
        let identifier = entry_point_identifier(record);

        let Some(factory) = self.entry_points.get(&identifier) else {
            warn!(plugin = %plugin, entry_point = %identifier, "Entry point not registered");
            return Ok(BootOutcome::MissingEntryPoint(identifier));
        };

        let booted = match factory.as_ref()(record) {
            Ok(unit) => self.host.register(record, unit).await,
            Err(e) => Err(e),
        };

        match booted {
            Ok(()) => {
                info!(plugin = %plugin, entry_point = %identifier, "Plugin booted");
                Ok(BootOutcome::Booted)
            }
            Err(e) => {
                error!(plugin = %plugin, entry_point = %identifier, error = %e, "Plugin boot failed");
                self.mark_failed(record).await?;
                Ok(BootOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn mark_failed(&self, record: &PluginRecord) -> Result<()> {
        let mut current = self
            .repository
            .find(&record.vendor, &record.name)
            .await?
            .unwrap_or_else(|| record.clone());
        current.status = PluginStatus::Failed;
        self.repository.update(&current).await
    }

    /// Get the configuration.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn entry_points(&self) -> &EntryPointRegistry {
        &self.entry_points
    }
}

/// Load a manifest from a file.
async fn load_manifest(path: &Path) -> Result<PluginManifest> {
    let content = tokio::fs::read_to_string(path).await?;
    PluginManifest::parse(&content)
}

/// Immediate subdirectories of `path`, sorted.
async fn list_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = tokio::fs::read_dir(path).await?;

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }

    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginError;
    use crate::repository::MemoryPluginRepository;
    use tempfile::TempDir;

    struct Quiet;

    #[async_trait]
    impl PluginBootstrap for Quiet {
        async fn boot(&self, _ctx: &BootContext) -> Result<()> {
            Ok(())
        }
    }

    fn record(entry_point: Option<&str>) -> PluginRecord {
        let manifest = PluginManifest {
            vendor: "acme".to_string(),
            name: "core".to_string(),
            version: "1.0.0".to_string(),
            entry_point: entry_point.map(str::to_string),
            ..Default::default()
        };
        PluginRecord::from_manifest(&manifest, PathBuf::new())
    }

    fn write_manifest(root: &Path, vendor: &str, name: &str, body: &str) {
        let dir = root.join(vendor).join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), body).unwrap();
    }

    fn loader(
        root: &Path,
        entry_points: EntryPointRegistry,
    ) -> (PluginLoader, Arc<MemoryPluginRepository>) {
        let repo = Arc::new(MemoryPluginRepository::new());
        let hooks = Arc::new(HookManager::new());
        let loader = PluginLoader::new(
            PluginConfig::with_plugins_dir(root),
            repo.clone(),
            Arc::new(entry_points),
            Arc::new(HookHost::new(hooks, Sandbox::default())),
        );
        (loader, repo)
    }

    #[test]
    fn test_entry_point_identifier() {
        assert_eq!(entry_point_identifier(&record(None)), "acme::core::Plugin");
        assert_eq!(
            entry_point_identifier(&record(Some("CorePlugin"))),
            "acme::core::CorePlugin"
        );
        assert_eq!(
            entry_point_identifier(&record(Some("shared::Bootstrap"))),
            "shared::Bootstrap"
        );
        assert_eq!(entry_point_identifier(&record(Some("  "))), "acme::core::Plugin");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = EntryPointRegistry::new().with("acme::core::Plugin", |_| {
            Ok(Box::new(Quiet) as Box<dyn PluginBootstrap>)
        });
        assert!(registry.contains("acme::core::Plugin"));
        assert_eq!(registry.identifiers(), vec!["acme::core::Plugin"]);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_discover_empty_paths() {
        let (loader, _) = loader(Path::new("/nonexistent/path"), EntryPointRegistry::new());
        assert!(loader.discover().await.is_empty());
    }

    #[tokio::test]
    async fn test_discover_skips_bad_manifests() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "acme",
            "core",
            r#"{"vendor":"acme","name":"core","version":"1.0.0"}"#,
        );
        write_manifest(dir.path(), "acme", "broken", "{ nope");
        write_manifest(
            dir.path(),
            "zeta",
            "noversion",
            r#"{"vendor":"zeta","name":"noversion"}"#,
        );
        std::fs::create_dir_all(dir.path().join("zeta").join("empty")).unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let (loader, _) = loader(dir.path(), EntryPointRegistry::new());
        let found = loader.discover().await;

        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["acme/core"]);
        assert_eq!(found["acme/core"].path, dir.path().join("acme").join("core"));
    }

    #[tokio::test]
    async fn test_boot_missing_entry_point_leaves_status() {
        let (loader, repo) = loader(Path::new("/tmp"), EntryPointRegistry::new());
        let mut rec = record(None);
        rec.status = PluginStatus::Active;
        repo.create(rec.clone()).await.unwrap();

        let outcome = loader.boot_plugin(&rec).await.unwrap();
        assert_eq!(
            outcome,
            BootOutcome::MissingEntryPoint("acme::core::Plugin".to_string())
        );
        assert_eq!(
            repo.find("acme", "core").await.unwrap().unwrap().status,
            PluginStatus::Active
        );
    }

    #[tokio::test]
    async fn test_boot_factory_error_marks_failed() {
        let registry = EntryPointRegistry::new().with("acme::core::Plugin", |r: &PluginRecord| {
            Err(PluginError::boot_error(r.full_name(), "factory exploded"))
        });
        let (loader, repo) = loader(Path::new("/tmp"), registry);
        let mut rec = record(None);
        rec.status = PluginStatus::Active;
        repo.create(rec.clone()).await.unwrap();

        let report = loader.boot_active_plugins().await.unwrap();
        assert_eq!(
            report,
            BootReport {
                booted: 0,
                missing: 0,
                failed: 1
            }
        );
        assert_eq!(
            repo.find("acme", "core").await.unwrap().unwrap().status,
            PluginStatus::Failed
        );
    }
}
