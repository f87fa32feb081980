//! Plugin management commands.
//!
//! Provides plugin management functionality:
//! - List and show installed plugins
//! - Install plugins from a local directory
//! - Enable/disable, update and remove plugins
//! - Sync the plugins directory
//! - Scan plugin sources, inspect permissions and hook points

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ledgerline_plugins::manifest::split_full_name;
use ledgerline_plugins::{
    EntryPointRegistry, HookManager, JsonPluginRepository, MANIFEST_FILE, Outcome, PluginConfig,
    PluginManager, PluginManifest, PluginRecord, PluginStatus, Sandbox, SecurityScanner, Severity,
    available_hook_points, permissions, scanner,
};

/// Plugin subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum PluginSubcommand {
    /// List installed plugins
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show an installed plugin
    #[command(visible_alias = "info")]
    Show(ShowArgs),

    /// Install a plugin from a local directory
    #[command(visible_alias = "add")]
    Install(InstallArgs),

    /// Enable a plugin
    Enable(TargetArgs),

    /// Disable a plugin
    Disable(TargetArgs),

    /// Update a plugin from a new manifest
    Update(UpdateArgs),

    /// Remove a plugin
    #[command(visible_aliases = ["rm", "uninstall"])]
    Remove(TargetArgs),

    /// Install every new manifest found in the plugins directory
    Discover(JsonArgs),

    /// Scan plugin sources for dangerous code patterns
    Scan(ScanArgs),

    /// Show the permission catalog or check a plugin's permissions
    Permissions(PermissionsArgs),

    /// List available hook points
    Hooks(JsonArgs),
}

/// Arguments for the list command.
#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show only plugins with this status (inactive, active, failed)
    #[arg(long)]
    pub status: Option<String>,
}

/// A plugin addressed as `vendor/name`.
#[derive(Debug, Parser)]
pub struct TargetArgs {
    /// Plugin full name (vendor/name)
    pub plugin: String,
}

#[derive(Debug, Parser)]
pub struct ShowArgs {
    /// Plugin full name (vendor/name)
    pub plugin: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the install command.
#[derive(Debug, Parser)]
pub struct InstallArgs {
    /// Directory containing plugin.json
    pub source: PathBuf,

    /// Install even if the scan reports critical issues
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Skip the security scan
    #[arg(long)]
    pub skip_scan: bool,
}

/// Arguments for the update command.
#[derive(Debug, Parser)]
pub struct UpdateArgs {
    /// Plugin full name (vendor/name)
    pub plugin: String,

    /// Path to the new plugin.json (defaults to the installed one)
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct JsonArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the scan command.
#[derive(Debug, Parser)]
pub struct ScanArgs {
    /// Plugin directory, or an installed plugin's vendor/name
    pub target: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the permissions command.
#[derive(Debug, Parser)]
pub struct PermissionsArgs {
    /// Check the declared permissions of an installed plugin (vendor/name)
    #[arg(long)]
    pub plugin: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Plugin information for display.
#[derive(Debug, Serialize)]
struct PluginInfo<'a> {
    name: String,
    version: &'a str,
    status: PluginStatus,
    description: &'a str,
    path: &'a Path,
}

impl<'a> From<&'a PluginRecord> for PluginInfo<'a> {
    fn from(record: &'a PluginRecord) -> Self {
        Self {
            name: record.full_name(),
            version: &record.version,
            status: record.status,
            description: &record.description,
            path: &record.path,
        }
    }
}

impl PluginSubcommand {
    /// Run the plugin command.
    pub async fn run(self, config: PluginConfig) -> Result<()> {
        let manager = build_manager(config);
        match self {
            Self::List(args) => run_list(&manager, args).await,
            Self::Show(args) => run_show(&manager, args).await,
            Self::Install(args) => run_install(&manager, args).await,
            Self::Enable(args) => {
                let (vendor, name) = parse_target(&args.plugin)?;
                report(manager.enable(vendor, name).await?)
            }
            Self::Disable(args) => {
                let (vendor, name) = parse_target(&args.plugin)?;
                report(manager.disable(vendor, name).await?)
            }
            Self::Update(args) => run_update(&manager, args).await,
            Self::Remove(args) => {
                let (vendor, name) = parse_target(&args.plugin)?;
                report(manager.remove(vendor, name).await?)
            }
            Self::Discover(args) => run_discover(&manager, args).await,
            Self::Scan(args) => run_scan(&manager, args).await,
            Self::Permissions(args) => run_permissions(&manager, args).await,
            Self::Hooks(args) => run_hooks(args),
        }
    }
}

fn build_manager(config: PluginConfig) -> PluginManager {
    let repository = Arc::new(JsonPluginRepository::new(&config.repository_path));
    let hooks = Arc::new(HookManager::from_config(&config));
    PluginManager::new(config, repository, hooks, EntryPointRegistry::new())
}

fn parse_target(plugin: &str) -> Result<(&str, &str)> {
    match split_full_name(plugin) {
        Some(parts) => Ok(parts),
        None => bail!("Expected a plugin as vendor/name, got '{}'", plugin),
    }
}

fn report(outcome: Outcome) -> Result<()> {
    if !outcome.success {
        bail!(outcome.message);
    }
    println!("{}", outcome.message);
    Ok(())
}

async fn find_record(manager: &PluginManager, plugin: &str) -> Result<PluginRecord> {
    let (vendor, name) = parse_target(plugin)?;
    match manager.get(vendor, name).await? {
        Some(record) => Ok(record),
        None => bail!("Plugin {} is not installed", plugin),
    }
}

async fn run_list(manager: &PluginManager, args: ListArgs) -> Result<()> {
    let status = match args.status.as_deref() {
        None => None,
        Some("inactive") => Some(PluginStatus::Inactive),
        Some("active") => Some(PluginStatus::Active),
        Some("failed") => Some(PluginStatus::Failed),
        Some(other) => bail!("Unknown status '{}'", other),
    };

    let records: Vec<PluginRecord> = manager
        .list()
        .await?
        .into_iter()
        .filter(|r| status.is_none_or(|s| r.status == s))
        .collect();

    if args.json {
        let plugins: Vec<PluginInfo<'_>> = records.iter().map(PluginInfo::from).collect();
        println!("{}", serde_json::to_string_pretty(&plugins)?);
    } else if records.is_empty() {
        println!("No plugins installed.");
        println!("\nPlugin directory: {}", manager.config().plugins_dir.display());
    } else {
        println!("Installed Plugins:");
        println!("{}", "-".repeat(60));
        for record in &records {
            let system = if record.is_system { " (system)" } else { "" };
            println!(
                "  {} v{} [{}]{}",
                record.full_name(),
                record.version,
                record.status,
                system
            );
            if !record.description.is_empty() {
                println!("    {}", record.description);
            }
        }
        println!("\nTotal: {} plugin(s)", records.len());
    }

    Ok(())
}

async fn run_show(manager: &PluginManager, args: ShowArgs) -> Result<()> {
    let record = find_record(manager, &args.plugin).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Plugin: {}", record.full_name());
    println!("{}", "-".repeat(40));
    if let Some(display_name) = &record.display_name {
        println!("  Name:        {}", display_name);
    }
    println!("  Version:     {}", record.version);
    println!("  Status:      {}", record.status);
    println!("  Path:        {}", record.path.display());
    println!("  Installed:   {}", record.installed_at.to_rfc3339());
    if let Some(at) = record.activated_at {
        println!("  Activated:   {}", at.to_rfc3339());
    }
    if let Some(at) = record.last_updated_at {
        println!("  Updated:     {}", at.to_rfc3339());
    }
    if !record.description.is_empty() {
        println!("  Description: {}", record.description);
    }
    if !record.permissions.is_empty() {
        println!("  Permissions:");
        for permission in &record.permissions {
            println!("    {} - {}", permission, permissions::describe(permission));
        }
    }
    if !record.dependencies.is_empty() {
        println!("  Dependencies:");
        for (dep, constraint) in &record.dependencies {
            println!("    {} {}", dep, constraint);
        }
    }

    Ok(())
}

async fn run_install(manager: &PluginManager, args: InstallArgs) -> Result<()> {
    if !args.source.is_dir() {
        bail!("Source path is not a directory: {}", args.source.display());
    }

    let manifest_path = args.source.join(MANIFEST_FILE);
    let manifest = PluginManifest::from_file(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

    if !args.skip_scan {
        let result = SecurityScanner::from_config(manager.config())
            .scan(&args.source)
            .await;
        print_issues(&result.issues);
        if result.highest_severity() == Some(Severity::Critical) && !args.force {
            bail!("Security scan found critical issues. Use --force to install anyway.");
        }
    }

    report(install_from_dir(manager, &args.source, &manifest).await?)
}

/// Install `manifest` and place `source` under the plugins directory.
///
/// A failed copy removes the new record again.
async fn install_from_dir(
    manager: &PluginManager,
    source: &Path,
    manifest: &PluginManifest,
) -> Result<Outcome> {
    let target = manager
        .config()
        .plugin_path(&manifest.vendor, &manifest.name);
    let copy = !same_dir(source, &target);
    let target_existed = target.exists();

    let outcome = manager.install(manifest).await?;
    if !outcome.success || !copy {
        return Ok(outcome);
    }

    if let Err(e) = copy_dir_recursive(source, &target) {
        manager.remove(&manifest.vendor, &manifest.name).await?;
        if !target_existed
            && let Err(cleanup) = std::fs::remove_dir_all(&target)
            && target.exists()
        {
            tracing::warn!(path = %target.display(), error = %cleanup, "Failed to clean up plugin directory");
        }
        return Err(e.context(format!("Failed to copy plugin into {}", target.display())));
    }
    Ok(outcome)
}

async fn run_update(manager: &PluginManager, args: UpdateArgs) -> Result<()> {
    let record = find_record(manager, &args.plugin).await?;
    let manifest_path = args
        .manifest
        .unwrap_or_else(|| record.path.join(MANIFEST_FILE));
    let manifest = PluginManifest::from_file(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;

    report(
        manager
            .update(&record.vendor, &record.name, &manifest)
            .await?,
    )
}

async fn run_discover(manager: &PluginManager, args: JsonArgs) -> Result<()> {
    let summary = manager.discover().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "Discovered {} plugin(s), installed {} new.",
        summary.discovered, summary.new
    );
    for rejected in &summary.rejected {
        println!("  skipped {}", rejected);
    }
    Ok(())
}

async fn run_scan(manager: &PluginManager, args: ScanArgs) -> Result<()> {
    let path = if Path::new(&args.target).exists() {
        PathBuf::from(&args.target)
    } else {
        find_record(manager, &args.target).await?.path
    };

    let result = SecurityScanner::from_config(manager.config())
        .scan(&path)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.safe {
        println!("No issues found in {}", path.display());
        return Ok(());
    }

    print_issues(&result.issues);
    println!("\nSummary:");
    for (issue_type, count) in scanner::summarize(&result.issues) {
        println!(
            "  {:<20} {:>4}  [{}]",
            issue_type,
            count,
            scanner::severity(&issue_type)
        );
    }
    Ok(())
}

async fn run_permissions(manager: &PluginManager, args: PermissionsArgs) -> Result<()> {
    let Some(plugin) = args.plugin else {
        let groups = permissions::grouped();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&groups)?);
            return Ok(());
        }
        for (category, entries) in groups {
            println!("{}:", category);
            for permission in entries {
                println!("  {:<22} {}", permission, permissions::describe(permission));
            }
        }
        return Ok(());
    };

    let record = find_record(manager, &plugin).await?;
    let validation = Sandbox::from_config(manager.config()).validate_permissions(&record);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&validation)?);
        return Ok(());
    }

    for permission in &record.permissions {
        println!(
            "  {:<22} [{}] {}",
            permission,
            permissions::category(permission),
            permissions::describe(permission)
        );
    }
    if validation.valid {
        println!("All declared permissions are recognized.");
    } else {
        println!("Unrecognized: {}", validation.unrecognized.join(", "));
    }
    Ok(())
}

fn run_hooks(args: JsonArgs) -> Result<()> {
    let points = available_hook_points();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }
    for point in points {
        println!("  {:<22} {}", point.name, point.description);
    }
    Ok(())
}

fn print_issues(issues: &[ledgerline_plugins::ScanIssue]) {
    for issue in issues {
        println!(
            "  [{}] {}:{} {}: {}",
            issue.severity(),
            issue.file,
            issue.line,
            issue.issue_type,
            issue.code
        );
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_plugins::MemoryPluginRepository;
    use tempfile::TempDir;

    fn manager(plugins_dir: &Path) -> PluginManager {
        PluginManager::new(
            PluginConfig::with_plugins_dir(plugins_dir),
            Arc::new(MemoryPluginRepository::new()),
            Arc::new(HookManager::new()),
            EntryPointRegistry::new(),
        )
    }

    fn source_plugin(root: &Path) -> PluginManifest {
        let body = r#"{"vendor":"acme","name":"core","version":"1.0.0"}"#;
        std::fs::write(root.join(MANIFEST_FILE), body).unwrap();
        std::fs::write(root.join("Plugin.php"), "<?php").unwrap();
        PluginManifest::parse(body).unwrap()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("acme/core").unwrap(), ("acme", "core"));
        assert!(parse_target("acme").is_err());
    }

    #[test]
    fn test_copy_dir_recursive() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("src")).unwrap();
        std::fs::write(src.path().join("plugin.json"), "{}").unwrap();
        std::fs::write(src.path().join("src").join("main.php"), "<?php").unwrap();

        let target = dst.path().join("acme").join("core");
        copy_dir_recursive(src.path(), &target).unwrap();

        assert!(target.join("plugin.json").is_file());
        assert!(target.join("src").join("main.php").is_file());
        assert!(!same_dir(src.path(), &target));
        assert!(same_dir(&target, &target));
    }

    #[tokio::test]
    async fn test_install_from_dir_copies_files() {
        let src = TempDir::new().unwrap();
        let plugins = TempDir::new().unwrap();
        let manifest = source_plugin(src.path());
        let manager = manager(plugins.path());

        let outcome = install_from_dir(&manager, src.path(), &manifest).await.unwrap();

        assert!(outcome.success);
        let target = plugins.path().join("acme").join("core");
        assert!(target.join("Plugin.php").is_file());
        assert!(manager.get("acme", "core").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_install_from_dir_copy_failure_drops_record() {
        let src = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let manifest = source_plugin(src.path());
        // The plugins directory is a regular file, so the copy cannot create it.
        let plugins = scratch.path().join("plugins");
        std::fs::write(&plugins, "not a directory").unwrap();
        let manager = manager(&plugins);

        let err = install_from_dir(&manager, src.path(), &manifest).await.unwrap_err();

        assert!(err.to_string().contains("Failed to copy plugin"));
        assert!(manager.get("acme", "core").await.unwrap().is_none());
        assert!(manager.list().await.unwrap().is_empty());
    }
}
