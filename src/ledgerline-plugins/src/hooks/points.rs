//! Well-known hook points.

use serde::Serialize;

/// A named extension slot the platform dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HookPoint {
    pub name: &'static str,
    pub description: &'static str,
}

pub const ACCOUNT_CREATED: &str = "account.created";
pub const DEPOSIT_COMPLETED: &str = "deposit.completed";
pub const DEPOSIT_FAILED: &str = "deposit.failed";
pub const WITHDRAWAL_COMPLETED: &str = "withdrawal.completed";
pub const TRANSFER_COMPLETED: &str = "transfer.completed";
pub const ORDER_PLACED: &str = "order.placed";
pub const ORDER_MATCHED: &str = "order.matched";
pub const ORDER_CANCELLED: &str = "order.cancelled";
pub const USER_REGISTERED: &str = "user.registered";
pub const USER_LOGGED_IN: &str = "user.logged_in";
pub const PLUGIN_INSTALLED: &str = "plugin.installed";
pub const PLUGIN_ENABLED: &str = "plugin.enabled";
pub const PLUGIN_DISABLED: &str = "plugin.disabled";
pub const PLUGIN_REMOVED: &str = "plugin.removed";

const HOOK_POINTS: &[HookPoint] = &[
    HookPoint {
        name: ACCOUNT_CREATED,
        description: "A customer account was opened",
    },
    HookPoint {
        name: DEPOSIT_COMPLETED,
        description: "A deposit was credited to an account",
    },
    HookPoint {
        name: DEPOSIT_FAILED,
        description: "A deposit was rejected or could not be settled",
    },
    HookPoint {
        name: WITHDRAWAL_COMPLETED,
        description: "A withdrawal was debited from an account",
    },
    HookPoint {
        name: TRANSFER_COMPLETED,
        description: "Funds moved between two accounts",
    },
    HookPoint {
        name: ORDER_PLACED,
        description: "A trading order entered the book",
    },
    HookPoint {
        name: ORDER_MATCHED,
        description: "Two trading orders were matched",
    },
    HookPoint {
        name: ORDER_CANCELLED,
        description: "A trading order was cancelled",
    },
    HookPoint {
        name: USER_REGISTERED,
        description: "A new user signed up",
    },
    HookPoint {
        name: USER_LOGGED_IN,
        description: "A user authenticated",
    },
    HookPoint {
        name: PLUGIN_INSTALLED,
        description: "A plugin was installed",
    },
    HookPoint {
        name: PLUGIN_ENABLED,
        description: "A plugin was enabled",
    },
    HookPoint {
        name: PLUGIN_DISABLED,
        description: "A plugin was disabled",
    },
    HookPoint {
        name: PLUGIN_REMOVED,
        description: "A plugin was removed",
    },
];

/// The fixed catalog of hook points.
pub fn available_hook_points() -> &'static [HookPoint] {
    HOOK_POINTS
}

/// Whether `name` is a catalogued hook point.
pub fn is_known_hook_point(name: &str) -> bool {
    HOOK_POINTS.iter().any(|point| point.name == name)
}
