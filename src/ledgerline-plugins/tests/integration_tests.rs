//! Integration tests across the plugin runtime components.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};

use ledgerline_plugins::hooks::{self, DEPOSIT_COMPLETED, ORDER_MATCHED, USER_LOGGED_IN};
use ledgerline_plugins::{
    DependencyResolver, DomainEvent, EventBus, HookListener, HookManager, HookPriority,
    HookReactor, JsonPluginRepository, MemoryPluginRepository, PluginConfig, PluginError,
    PluginManifest, PluginRecord, PluginRepository, PluginStatus, Result, Sandbox,
    SecurityScanner, Severity, permissions, scanner,
};

// ============================================================================
// SHARED HELPERS
// ============================================================================

struct Recorder {
    hook: &'static str,
    label: &'static str,
    priority: i32,
    log: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

#[async_trait]
impl HookListener for Recorder {
    fn hook_name(&self) -> &str {
        self.hook
    }

    fn priority(&self) -> HookPriority {
        HookPriority(self.priority)
    }

    async fn handle(&self, payload: &serde_json::Value) -> Result<()> {
        self.log
            .lock()
            .await
            .push((self.label.to_string(), payload.clone()));
        Ok(())
    }
}

fn record(vendor: &str, name: &str, version: &str, status: PluginStatus) -> PluginRecord {
    let manifest = PluginManifest {
        vendor: vendor.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        ..Default::default()
    };
    let mut record = PluginRecord::from_manifest(&manifest, format!("/p/{vendor}/{name}").into());
    record.status = status;
    record
}

// ============================================================================
// EVENT REACTOR TESTS
// ============================================================================

mod reactor_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_domain_event_reaches_hook_listeners() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = Arc::new(HookManager::new());
        hooks
            .register(Arc::new(Recorder {
                hook: DEPOSIT_COMPLETED,
                label: "audit",
                priority: 100,
                log: Arc::clone(&log),
            }))
            .await;

        let bus = EventBus::new();
        HookReactor::attach(&bus, Arc::clone(&hooks)).await;

        let handled = bus
            .publish(&DomainEvent::DepositCompleted {
                deposit_id: "dep-7".to_string(),
                account_id: "acc-1".to_string(),
                amount: "250.00".to_string(),
                currency: "EUR".to_string(),
            })
            .await;

        assert_eq!(handled, 1);
        let log = log.lock().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1["deposit_id"], json!("dep-7"));
        assert_eq!(log[0].1["amount"], json!("250.00"));
    }

    #[tokio::test]
    async fn test_each_event_maps_to_one_known_hook() {
        let events = vec![
            DomainEvent::OrderMatched {
                trade_id: "t-1".to_string(),
                buy_order_id: "b-1".to_string(),
                sell_order_id: "s-1".to_string(),
                market: "BTC-EUR".to_string(),
                price: "61000".to_string(),
                quantity: "0.5".to_string(),
            },
            DomainEvent::UserLoggedIn {
                user_id: "u-1".to_string(),
                ip_address: None,
            },
        ];

        let hooks_hit: Vec<&str> = events
            .iter()
            .map(|e| ledgerline_plugins::hook_call_for(e).0)
            .collect();

        assert_eq!(hooks_hit, vec![ORDER_MATCHED, USER_LOGGED_IN]);
        assert!(hooks_hit.iter().all(|h| hooks::is_known_hook_point(h)));
    }

    #[tokio::test]
    async fn test_detached_reactor_stops_dispatching() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = Arc::new(HookManager::new());
        hooks
            .register(Arc::new(Recorder {
                hook: USER_LOGGED_IN,
                label: "security",
                priority: 100,
                log: Arc::clone(&log),
            }))
            .await;

        let bus = EventBus::new();
        let subscription = HookReactor::attach(&bus, Arc::clone(&hooks)).await;
        bus.unsubscribe(&subscription).await;

        let handled = bus
            .publish(&DomainEvent::UserLoggedIn {
                user_id: "u-1".to_string(),
                ip_address: Some("10.0.0.1".to_string()),
            })
            .await;

        assert_eq!(handled, 0);
        assert!(log.lock().await.is_empty());
    }
}

// ============================================================================
// HOOK DISPATCH TESTS
// ============================================================================

mod dispatch_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_listeners_run_in_priority_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = HookManager::new();
        for (label, priority) in [("late", 200), ("first", 10), ("tie-a", 100), ("tie-b", 100)] {
            hooks
                .register(Arc::new(Recorder {
                    hook: "x",
                    label,
                    priority,
                    log: Arc::clone(&log),
                }))
                .await;
        }

        let summary = hooks.dispatch("x", &json!({})).await;

        assert_eq!(summary.invoked, 4);
        let order: Vec<String> = log.lock().await.iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(order, vec!["first", "tie-a", "tie-b", "late"]);
    }

    #[tokio::test]
    async fn test_unregistered_hook_is_silent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = HookManager::new();
        hooks
            .register(Arc::new(Recorder {
                hook: "x",
                label: "only",
                priority: 100,
                log: Arc::clone(&log),
            }))
            .await;

        assert_eq!(hooks.unregister("x").await, 1);
        let summary = hooks.dispatch("x", &json!({})).await;

        assert_eq!(summary.invoked, 0);
        assert!(!hooks.has_listeners("x").await);
    }
}

// ============================================================================
// DEPENDENCY RESOLUTION TESTS
// ============================================================================

mod resolver_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_caret_scenario() {
        let repository = Arc::new(MemoryPluginRepository::new());
        assert_ok!(
            repository
                .create(record("a", "x", "2.3.1", PluginStatus::Active))
                .await
        );
        let resolver = DependencyResolver::new(repository);

        for (constraint, satisfied) in [("^2.0.0", true), ("^3.0.0", false)] {
            let manifest = PluginManifest {
                vendor: "b".to_string(),
                name: "y".to_string(),
                version: "1.0.0".to_string(),
                dependencies: [("a/x".to_string(), constraint.to_string())].into(),
                ..Default::default()
            };
            let resolution = assert_ok!(resolver.resolve(&manifest).await);
            assert_eq!(resolution.satisfied, satisfied, "{constraint}");
        }
    }

    #[tokio::test]
    async fn test_dag_of_depth_three_is_not_circular() {
        let repository = Arc::new(MemoryPluginRepository::new());
        let mut c = record("v", "c", "1.0.0", PluginStatus::Active);
        c.dependencies = [("v/d".to_string(), "^1.0.0".to_string())].into();
        let mut b = record("v", "b", "1.0.0", PluginStatus::Active);
        b.dependencies = [("v/c".to_string(), "^1.0.0".to_string())].into();
        for r in [b, c, record("v", "d", "1.0.0", PluginStatus::Active)] {
            assert_ok!(repository.create(r).await);
        }
        let resolver = DependencyResolver::new(repository);

        let manifest = PluginManifest {
            vendor: "v".to_string(),
            name: "a".to_string(),
            version: "1.0.0".to_string(),
            dependencies: [("v/b".to_string(), "^1.0.0".to_string())].into(),
            ..Default::default()
        };

        assert!(!assert_ok!(resolver.detect_circular_dependencies(&manifest).await));
        assert!(assert_ok!(resolver.resolve(&manifest).await).satisfied);
    }
}

// ============================================================================
// SECURITY SCANNER TESTS
// ============================================================================

mod scanner_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_eval_line() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.php"), "<?php\neval($x);\n").unwrap();

        let result = SecurityScanner::default().scan(temp.path()).await;

        assert!(!result.safe);
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.file, "a.php");
        assert_eq!(issue.line, 2);
        assert_eq!(issue.issue_type, "eval");
        assert_eq!(issue.code, "eval($x);");
        assert_eq!(scanner::severity(&issue.issue_type), Severity::Critical);
    }

    #[tokio::test]
    async fn test_nested_tree_and_summary() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src").join("Jobs");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("Sync.php"),
            "<?php\n$rows = DB::raw('select 1');\n$body = curl_exec($ch);\n$more = curl_exec($ch2);\n",
        )
        .unwrap();
        std::fs::write(temp.path().join("README.md"), "eval(everything)").unwrap();

        let result = SecurityScanner::default().scan(temp.path()).await;
        let summary = scanner::summarize(&result.issues);

        assert_eq!(summary.get("raw_sql"), Some(&1));
        assert_eq!(summary.get("curl_exec"), Some(&2));
        assert!(!summary.contains_key("eval"));
        assert!(result.issues.iter().all(|i| i.file == "src/Jobs/Sync.php"));
        assert_eq!(result.highest_severity(), Some(Severity::High));
    }

    #[tokio::test]
    async fn test_missing_path_is_safe() {
        let temp = TempDir::new().unwrap();
        let result = SecurityScanner::default()
            .scan(&temp.path().join("nope"))
            .await;

        assert!(result.safe);
        assert!(result.issues.is_empty());
    }
}

// ============================================================================
// SANDBOX AND PERMISSION TESTS
// ============================================================================

mod sandbox_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disabled_sandbox_grants_everything() {
        let plugin = record("acme", "core", "1.0.0", PluginStatus::Active);
        let sandbox = Sandbox::new(false);

        assert!(sandbox.has_permission(&plugin, "admin.access"));
        assert!(sandbox.can_access(&plugin, &["admin.access", "database.write"]));
        assert_ok!(sandbox.enforce(&plugin, "admin.access"));
    }

    #[test]
    fn test_enabled_sandbox_denies_undeclared() {
        let mut plugin = record("acme", "core", "1.0.0", PluginStatus::Active);
        plugin.permissions = ["accounts.read".to_string()].into();
        let sandbox = Sandbox::new(true);

        assert!(sandbox.has_permission(&plugin, "accounts.read"));
        assert_eq!(
            sandbox.missing_permissions(&plugin, &["accounts.read", "accounts.write"]),
            vec!["accounts.write".to_string()]
        );

        let err = assert_err!(sandbox.enforce(&plugin, "accounts.write"));
        assert!(matches!(err, PluginError::PermissionDenied { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_permission_validation_against_catalog() {
        let check = permissions::validate(["accounts.read", "teleport", "orders.write"]);
        assert!(!check.valid);
        assert_eq!(check.invalid, vec!["teleport".to_string()]);
        assert!(permissions::validate(["accounts.read", "orders.write"]).valid);

        let mut plugin = record("acme", "core", "1.0.0", PluginStatus::Active);
        plugin.permissions = ["accounts.read".to_string(), "teleport".to_string()].into();
        let validation = Sandbox::default().validate_permissions(&plugin);
        assert!(!validation.valid);
        assert_eq!(validation.unrecognized, vec!["teleport".to_string()]);
    }
}

// ============================================================================
// REPOSITORY AND CONFIG TESTS
// ============================================================================

mod storage_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_json_repository_round_trips_across_instances() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("plugins.json");

        {
            let repository = JsonPluginRepository::new(&path);
            assert_ok!(
                repository
                    .create(record("acme", "core", "1.0.0", PluginStatus::Active))
                    .await
            );
            assert_ok!(
                repository
                    .create(record("acme", "fx", "0.1.0", PluginStatus::Inactive))
                    .await
            );
        }

        let reopened = JsonPluginRepository::new(&path);
        let active = assert_ok!(reopened.find_by_status(PluginStatus::Active).await);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].full_name(), "acme/core");
        assert!(assert_ok!(reopened.delete("acme", "fx").await));
        assert_eq!(assert_ok!(reopened.list().await).len(), 1);
    }

    #[test]
    fn test_config_file_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plugins.toml");
        std::fs::write(
            &path,
            "plugins_dir = \"/opt/ledgerline/plugins\"\nauto_discover = true\nhook_timeout_ms = 0\n",
        )
        .unwrap();

        let config = assert_ok!(PluginConfig::from_file(&path));

        assert_eq!(
            config.plugin_path("acme", "core"),
            std::path::PathBuf::from("/opt/ledgerline/plugins/acme/core")
        );
        assert!(config.auto_discover);
        assert!(config.sandbox_enabled);
        assert!(config.hook_timeout().is_none());
        assert!(config.scan_extensions.iter().any(|e| e == "php"));
    }
}
