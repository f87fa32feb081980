//! Named extension points for plugins.
//!
//! Hooks allow plugins to react to:
//! - Account lifecycle (opened accounts, new users, logins)
//! - Money movement (deposits, withdrawals, transfers)
//! - Trading (orders placed, matched, cancelled)
//! - Plugin lifecycle (installed, enabled, disabled, removed)
//!
//! # Hook Priority
//! Listeners run in priority order (lowest value first), ties in
//! registration order. Every listener runs in isolation: an error, panic or
//! timeout in one is logged and never reaches the other listeners or the
//! dispatching caller.

mod dispatcher;
mod points;
mod registry;
mod types;

pub use points::{
    ACCOUNT_CREATED, DEPOSIT_COMPLETED, DEPOSIT_FAILED, HookPoint, ORDER_CANCELLED,
    ORDER_MATCHED, ORDER_PLACED, PLUGIN_DISABLED, PLUGIN_ENABLED, PLUGIN_INSTALLED,
    PLUGIN_REMOVED, TRANSFER_COMPLETED, USER_LOGGED_IN, USER_REGISTERED, WITHDRAWAL_COMPLETED,
    available_hook_points, is_known_hook_point,
};
pub use registry::HookManager;
pub use types::{DispatchSummary, HookListener, HookPriority, ListenerId};
