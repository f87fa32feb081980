//! Catalog of capabilities a plugin may request.
//!
//! The catalog is a compiled, immutable table. Every lookup defaults
//! gracefully on unknown input.

use std::collections::BTreeMap;

use serde::Serialize;

/// Description returned for permissions outside the catalog.
pub const UNKNOWN_DESCRIPTION: &str = "Unknown permission";

/// Category returned for permissions outside the catalog.
pub const UNKNOWN_CATEGORY: &str = "Other";

/// Required to attach hook listeners while booting.
pub const HOOKS_REGISTER: &str = "hooks.register";

/// `(permission, description, category)`
const CATALOG: &[(&str, &str, &str)] = &[
    ("accounts.read", "Read account details and balances", "Accounts"),
    ("accounts.write", "Create and modify accounts", "Accounts"),
    ("transactions.read", "Read deposits, withdrawals and transfers", "Transactions"),
    ("transactions.write", "Create and modify transactions", "Transactions"),
    ("orders.read", "Read trading orders", "Trading"),
    ("orders.write", "Place and cancel trading orders", "Trading"),
    ("market.read", "Read market data and order books", "Trading"),
    ("users.read", "Read user profiles", "Users"),
    ("users.write", "Modify user profiles", "Users"),
    ("notifications.send", "Send notifications to users", "Communication"),
    (HOOKS_REGISTER, "Register listeners on hook points", "System"),
    ("settings.read", "Read platform settings", "System"),
    ("settings.write", "Modify platform settings", "System"),
    ("storage.read", "Read files from plugin storage", "System"),
    ("storage.write", "Write files to plugin storage", "System"),
    ("database.read", "Run read-only database queries", "Data"),
    ("database.write", "Run database writes", "Data"),
    ("network.outbound", "Make outbound HTTP requests", "Network"),
    ("admin.access", "Access administrative functions", "Administration"),
];

/// Outcome of checking a list of requested permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionCheck {
    /// Whether every requested permission is in the catalog
    pub valid: bool,
    /// Requested permissions that are not in the catalog
    pub invalid: Vec<String>,
}

/// All valid permission strings.
pub fn all() -> Vec<&'static str> {
    CATALOG.iter().map(|(permission, _, _)| *permission).collect()
}

/// Check if a permission is in the catalog.
pub fn is_valid(permission: &str) -> bool {
    lookup(permission).is_some()
}

/// Human-readable description of a permission.
pub fn describe(permission: &str) -> &'static str {
    lookup(permission).map_or(UNKNOWN_DESCRIPTION, |entry| entry.1)
}

/// Category of a permission.
pub fn category(permission: &str) -> &'static str {
    lookup(permission).map_or(UNKNOWN_CATEGORY, |entry| entry.2)
}

/// Partition requested permissions against the catalog.
pub fn validate<I, S>(requested: I) -> PermissionCheck
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let invalid: Vec<String> = requested
        .into_iter()
        .filter(|p| !is_valid(p.as_ref()))
        .map(|p| p.as_ref().to_string())
        .collect();

    PermissionCheck {
        valid: invalid.is_empty(),
        invalid,
    }
}

/// Catalog entries bucketed by category.
pub fn grouped() -> BTreeMap<&'static str, Vec<&'static str>> {
    let mut groups: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();
    for &(permission, _, category) in CATALOG {
        groups.entry(category).or_default().push(permission);
    }
    groups
}

fn lookup(permission: &str) -> Option<&'static (&'static str, &'static str, &'static str)> {
    CATALOG.iter().find(|(p, _, _)| *p == permission)
}
