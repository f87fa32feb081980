//! # Ledgerline Plugin Runtime
//!
//! Discovers, validates, installs, activates and runs third-party extensions
//! for the Ledgerline banking platform.
//!
//! ## Features
//!
//! - **Manifests**: `plugin.json` identity, version, permissions and dependencies
//! - **Dependency Resolution**: `^`, `~`, `>=` and exact constraints with cycle detection
//! - **Lifecycle**: install, enable, disable, update and remove with persisted records
//! - **Hook System**: priority-ordered listeners isolated from each other's failures
//! - **Event Reactor**: domain events translated into hook dispatches
//! - **Sandbox**: capability checks against a fixed permission catalog
//! - **Security Scanner**: static detection of dangerous code patterns
//!
//! ## Plugin Structure
//!
//! ```text
//! plugins/
//! └── acme/
//!     └── fx-rates/
//!         ├── plugin.json   # Plugin manifest
//!         └── src/...       # Scanned source files
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ledgerline_plugins::{
//!     EntryPointRegistry, HookManager, JsonPluginRepository, PluginConfig, PluginManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PluginConfig::default().with_env_overrides();
//!     let repository = Arc::new(JsonPluginRepository::new(&config.repository_path));
//!     let hooks = Arc::new(HookManager::from_config(&config));
//!     let manager = PluginManager::new(config, repository, hooks, EntryPointRegistry::new());
//!
//!     manager.discover().await?;
//!     for plugin in manager.list().await? {
//!         println!("{}: {} ({})", plugin.full_name(), plugin.version, plugin.status);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod permissions;
pub mod record;
pub mod repository;
pub mod resolver;
pub mod sandbox;
pub mod scanner;
pub mod version;

// Re-exports for convenience
pub use config::PluginConfig;
pub use error::{PluginError, Result};
pub use events::{
    DomainEvent, EventBus, EventHandler, EventSubscription, EventType, HookReactor, hook_call_for,
};
pub use hooks::{
    DispatchSummary, HookListener, HookManager, HookPoint, HookPriority, ListenerId,
    available_hook_points, is_known_hook_point,
};
pub use loader::{
    BootContext, BootOutcome, BootReport, DiscoveredPlugin, EntryPointRegistry, HookHost,
    PluginBootstrap, PluginHost, PluginLoader,
};
pub use manager::{DiscoverSummary, Outcome, PluginManager, StartupReport};
pub use manifest::PluginManifest;
pub use permissions::PermissionCheck;
pub use record::{PluginRecord, PluginStatus};
pub use repository::{JsonPluginRepository, MemoryPluginRepository, PluginRepository};
pub use resolver::{DependencyResolver, Resolution};
pub use sandbox::{PermissionValidation, Sandbox};
pub use scanner::{ScanIssue, ScanResult, SecurityScanner, Severity};
pub use version::{Constraint, satisfies_constraint};

/// Plugin runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default plugin directory name
pub const PLUGIN_DIR: &str = "plugins";

/// Plugin manifest filename
pub const MANIFEST_FILE: &str = "plugin.json";
