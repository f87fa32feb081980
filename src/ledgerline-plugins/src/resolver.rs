//! Dependency resolution against installed plugins.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::Result;
use crate::manifest::{PluginManifest, split_full_name};
use crate::repository::PluginRepository;
use crate::version::satisfies_constraint;

/// Result of resolving a manifest's dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// No missing dependencies and no cycle
    pub satisfied: bool,
    /// Unmet dependencies, with a reason suffix when the plugin exists
    pub missing: Vec<String>,
    /// A dependency cycle is reachable from the manifest
    pub circular: bool,
}

/// Checks declared dependencies against the plugin repository.
pub struct DependencyResolver {
    repository: Arc<dyn PluginRepository>,
}

impl DependencyResolver {
    pub fn new(repository: Arc<dyn PluginRepository>) -> Self {
        Self { repository }
    }

    /// Resolve all dependencies of a manifest.
    ///
    /// A dependency is met only by an *active* installed plugin whose
    /// version satisfies the declared constraint.
    pub async fn resolve(&self, manifest: &PluginManifest) -> Result<Resolution> {
        let mut missing = Vec::new();

        for (dep, constraint) in &manifest.dependencies {
            let Some((vendor, name)) = split_full_name(dep) else {
                missing.push(format!("{} (invalid dependency name)", dep));
                continue;
            };

            match self.repository.find(vendor, name).await? {
                Some(record) if record.is_active() => {
                    if !satisfies_constraint(&record.version, constraint) {
                        missing.push(format!(
                            "{} (requires {}, installed: {})",
                            dep, constraint, record.version
                        ));
                    }
                }
                _ => missing.push(dep.clone()),
            }
        }

        let circular = self.detect_circular_dependencies(manifest).await?;
        let satisfied = missing.is_empty() && !circular;

        debug!(
            plugin = %manifest.full_name(),
            satisfied,
            circular,
            missing = missing.len(),
            "Resolved dependencies"
        );

        Ok(Resolution {
            satisfied,
            missing,
            circular,
        })
    }

    /// Depth-first search for a cycle reachable from the manifest.
    ///
    /// The root node uses the manifest's own dependencies; every other node
    /// uses the dependencies of its installed record, whatever its status.
    /// Nodes without a record are leaves.
    pub async fn detect_circular_dependencies(&self, manifest: &PluginManifest) -> Result<bool> {
        let root = manifest.full_name();

        let mut path = vec![root.clone()];
        let mut on_path: HashSet<String> = HashSet::from([root]);
        let mut finished: HashSet<String> = HashSet::new();
        let mut stack = vec![dependency_keys(&manifest.dependencies).into_iter()];

        while let Some(frame) = stack.last_mut() {
            match frame.next() {
                Some(dep) => {
                    if on_path.contains(&dep) {
                        debug!(plugin = %manifest.full_name(), via = %dep, "Dependency cycle found");
                        return Ok(true);
                    }
                    if finished.contains(&dep) {
                        continue;
                    }

                    let deps = match split_full_name(&dep) {
                        Some((vendor, name)) => self
                            .repository
                            .find(vendor, name)
                            .await?
                            .map(|record| dependency_keys(&record.dependencies))
                            .unwrap_or_default(),
                        None => Vec::new(),
                    };

                    on_path.insert(dep.clone());
                    path.push(dep);
                    stack.push(deps.into_iter());
                }
                None => {
                    stack.pop();
                    if let Some(node) = path.pop() {
                        on_path.remove(&node);
                        finished.insert(node);
                    }
                }
            }
        }

        Ok(false)
    }
}

// Malformed keys cannot name a plugin and are skipped by the walk.
fn dependency_keys(dependencies: &BTreeMap<String, String>) -> Vec<String> {
    dependencies
        .keys()
        .filter(|dep| split_full_name(dep).is_some())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PluginRecord, PluginStatus};
    use crate::repository::MemoryPluginRepository;
    use std::path::PathBuf;

    fn manifest(full_name: &str, version: &str, deps: &[(&str, &str)]) -> PluginManifest {
        let (vendor, name) = split_full_name(full_name).unwrap();
        PluginManifest {
            vendor: vendor.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            dependencies: deps
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    async fn install(
        repo: &MemoryPluginRepository,
        full_name: &str,
        version: &str,
        deps: &[(&str, &str)],
        status: PluginStatus,
    ) {
        let mut record =
            PluginRecord::from_manifest(&manifest(full_name, version, deps), PathBuf::new());
        record.status = status;
        repo.create(record).await.unwrap();
    }

    fn resolver(repo: Arc<MemoryPluginRepository>) -> DependencyResolver {
        DependencyResolver::new(repo)
    }

    #[tokio::test]
    async fn test_missing_dependency() {
        let repo = Arc::new(MemoryPluginRepository::new());
        let resolution = resolver(repo)
            .resolve(&manifest("acme/pay", "1.0.0", &[("acme/core", "^2.0.0")]))
            .await
            .unwrap();

        assert_eq!(
            resolution,
            Resolution {
                satisfied: false,
                missing: vec!["acme/core".to_string()],
                circular: false,
            }
        );
    }

    #[tokio::test]
    async fn test_inactive_dependency_is_missing() {
        let repo = Arc::new(MemoryPluginRepository::new());
        install(&repo, "acme/core", "2.3.1", &[], PluginStatus::Inactive).await;

        let resolution = resolver(repo)
            .resolve(&manifest("acme/pay", "1.0.0", &[("acme/core", "^2.0.0")]))
            .await
            .unwrap();
        assert_eq!(resolution.missing, vec!["acme/core".to_string()]);
    }

    #[tokio::test]
    async fn test_version_mismatch_reason() {
        let repo = Arc::new(MemoryPluginRepository::new());
        install(&repo, "acme/core", "2.3.1", &[], PluginStatus::Active).await;
        let resolver = resolver(repo);

        let ok = resolver
            .resolve(&manifest("acme/pay", "1.0.0", &[("acme/core", "^2.0.0")]))
            .await
            .unwrap();
        assert!(ok.satisfied);

        let bad = resolver
            .resolve(&manifest("acme/pay", "1.0.0", &[("acme/core", "^3.0.0")]))
            .await
            .unwrap();
        assert!(!bad.satisfied);
        assert_eq!(
            bad.missing,
            vec!["acme/core (requires ^3.0.0, installed: 2.3.1)".to_string()]
        );
    }

    #[tokio::test]
    async fn test_invalid_dependency_key() {
        let repo = Arc::new(MemoryPluginRepository::new());
        let resolution = resolver(repo)
            .resolve(&manifest("acme/pay", "1.0.0", &[("core", "1.0.0")]))
            .await
            .unwrap();
        assert_eq!(
            resolution.missing,
            vec!["core (invalid dependency name)".to_string()]
        );
        assert!(!resolution.circular);
    }

    #[tokio::test]
    async fn test_cycle_through_installed_records() {
        let repo = Arc::new(MemoryPluginRepository::new());
        install(&repo, "acme/b", "1.0.0", &[("acme/c", "*")], PluginStatus::Inactive).await;
        install(&repo, "acme/c", "1.0.0", &[("acme/a", "*")], PluginStatus::Active).await;

        let resolver = resolver(repo);
        let root = manifest("acme/a", "1.0.0", &[("acme/b", "1.0.0")]);
        assert!(resolver.detect_circular_dependencies(&root).await.unwrap());

        let resolution = resolver.resolve(&root).await.unwrap();
        assert!(resolution.circular);
        assert!(!resolution.satisfied);
    }

    #[tokio::test]
    async fn test_self_dependency_is_cycle() {
        let repo = Arc::new(MemoryPluginRepository::new());
        let root = manifest("acme/a", "1.0.0", &[("acme/a", "1.0.0")]);
        assert!(resolver(repo).detect_circular_dependencies(&root).await.unwrap());
    }

    #[tokio::test]
    async fn test_diamond_dag_is_not_cycle() {
        let repo = Arc::new(MemoryPluginRepository::new());
        install(&repo, "acme/d", "1.0.0", &[], PluginStatus::Active).await;
        install(&repo, "acme/c", "1.0.0", &[("acme/d", "^1.0.0")], PluginStatus::Active).await;
        install(
            &repo,
            "acme/b",
            "1.0.0",
            &[("acme/c", "^1.0.0"), ("acme/d", "^1.0.0")],
            PluginStatus::Active,
        )
        .await;

        let root = manifest("acme/a", "1.0.0", &[("acme/b", "^1.0.0"), ("acme/c", "^1.0.0")]);
        let resolution = resolver(repo).resolve(&root).await.unwrap();
        assert!(!resolution.circular);
        assert!(resolution.satisfied);
    }

    #[tokio::test]
    async fn test_unreachable_cycle_is_ignored() {
        let repo = Arc::new(MemoryPluginRepository::new());
        install(&repo, "acme/x", "1.0.0", &[("acme/y", "*")], PluginStatus::Active).await;
        install(&repo, "acme/y", "1.0.0", &[("acme/x", "*")], PluginStatus::Active).await;
        install(&repo, "acme/core", "1.0.0", &[], PluginStatus::Active).await;

        let root = manifest("acme/a", "1.0.0", &[("acme/core", "^1.0.0")]);
        assert!(!resolver(repo).detect_circular_dependencies(&root).await.unwrap());
    }
}
