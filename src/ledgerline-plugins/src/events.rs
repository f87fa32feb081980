//! Domain event bus and the hook reactor.
//!
//! The platform publishes typed [`DomainEvent`]s on an [`EventBus`]. The
//! [`HookReactor`] subscribes to all of them and re-emits each one as a
//! named hook dispatch with a normalized JSON payload. The mapping lives in
//! [`hook_call_for`] and nowhere else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hooks::{self, HookManager};

/// Events raised by the banking platform.
///
/// Monetary amounts are decimal strings so no precision is lost in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ========== Account Events ==========
    AccountCreated {
        account_id: String,
        user_id: String,
        currency: String,
    },

    // ========== Money Movement Events ==========
    DepositCompleted {
        deposit_id: String,
        account_id: String,
        amount: String,
        currency: String,
    },

    DepositFailed {
        deposit_id: String,
        account_id: String,
        amount: String,
        currency: String,
        reason: String,
    },

    WithdrawalCompleted {
        withdrawal_id: String,
        account_id: String,
        amount: String,
        currency: String,
    },

    TransferCompleted {
        transfer_id: String,
        from_account_id: String,
        to_account_id: String,
        amount: String,
        currency: String,
    },

    // ========== Trading Events ==========
    OrderPlaced {
        order_id: String,
        user_id: String,
        market: String,
        side: String,
        price: String,
        quantity: String,
    },

    OrderMatched {
        trade_id: String,
        buy_order_id: String,
        sell_order_id: String,
        market: String,
        price: String,
        quantity: String,
    },

    OrderCancelled {
        order_id: String,
        user_id: String,
        market: String,
    },

    // ========== User Events ==========
    UserRegistered {
        user_id: String,
        email: String,
    },

    UserLoggedIn {
        user_id: String,
        ip_address: Option<String>,
    },
}

/// Event type filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    AccountCreated,
    DepositCompleted,
    DepositFailed,
    WithdrawalCompleted,
    TransferCompleted,
    OrderPlaced,
    OrderMatched,
    OrderCancelled,
    UserRegistered,
    UserLoggedIn,
    /// Wildcard
    All,
}

impl From<&DomainEvent> for EventType {
    fn from(event: &DomainEvent) -> Self {
        match event {
            DomainEvent::AccountCreated { .. } => EventType::AccountCreated,
            DomainEvent::DepositCompleted { .. } => EventType::DepositCompleted,
            DomainEvent::DepositFailed { .. } => EventType::DepositFailed,
            DomainEvent::WithdrawalCompleted { .. } => EventType::WithdrawalCompleted,
            DomainEvent::TransferCompleted { .. } => EventType::TransferCompleted,
            DomainEvent::OrderPlaced { .. } => EventType::OrderPlaced,
            DomainEvent::OrderMatched { .. } => EventType::OrderMatched,
            DomainEvent::OrderCancelled { .. } => EventType::OrderCancelled,
            DomainEvent::UserRegistered { .. } => EventType::UserRegistered,
            DomainEvent::UserLoggedIn { .. } => EventType::UserLoggedIn,
        }
    }
}

/// Subscriber to domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &DomainEvent) -> crate::Result<()>;

    /// Get the event types this handler is interested in.
    fn event_types(&self) -> Vec<EventType>;
}

/// Event subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventSubscription {
    id: Uuid,
    subscriber: String,
}

impl EventSubscription {
    /// Create a new subscription.
    pub fn new(subscriber: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber: subscriber.to_string(),
        }
    }

    /// Get the subscription ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }
}

/// Handler entry with its filter.
type HandlerEntry = (Arc<dyn EventHandler>, Vec<EventType>);

/// Event bus for publishing and subscribing to domain events.
pub struct EventBus {
    handlers: RwLock<HashMap<Uuid, HandlerEntry>>,
    subscriptions: RwLock<HashMap<Uuid, EventSubscription>>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to events.
    pub async fn subscribe(
        &self,
        subscriber: &str,
        handler: Arc<dyn EventHandler>,
    ) -> EventSubscription {
        let subscription = EventSubscription::new(subscriber);
        let event_types = handler.event_types();

        let mut handlers = self.handlers.write().await;
        handlers.insert(subscription.id, (handler, event_types));

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id, subscription.clone());

        subscription
    }

    /// Unsubscribe from events.
    pub async fn unsubscribe(&self, subscription: &EventSubscription) {
        let mut handlers = self.handlers.write().await;
        handlers.remove(&subscription.id);

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.remove(&subscription.id);
    }

    /// Publish an event to all matching subscribers.
    ///
    /// Handlers run one after another and are awaited, so by the time this
    /// returns every hook the event triggers has been dispatched. Handler
    /// errors are logged. Returns the number of handlers invoked.
    pub async fn publish(&self, event: &DomainEvent) -> usize {
        let event_type = EventType::from(event);
        let matching: Vec<(Uuid, Arc<dyn EventHandler>)> = self
            .handlers
            .read()
            .await
            .iter()
            .filter(|(_, (_, types))| {
                types.contains(&EventType::All) || types.contains(&event_type)
            })
            .map(|(id, (handler, _))| (*id, Arc::clone(handler)))
            .collect();

        for (id, handler) in &matching {
            if let Err(e) = handler.handle(event).await {
                warn!(subscription = %id, event = ?event_type, error = %e, "Event handler error");
            }
        }

        matching.len()
    }

    /// Get the number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Hook name and normalized payload for a domain event.
pub fn hook_call_for(event: &DomainEvent) -> (&'static str, serde_json::Value) {
    match event {
        DomainEvent::AccountCreated {
            account_id,
            user_id,
            currency,
        } => (
            hooks::ACCOUNT_CREATED,
            json!({ "account_id": account_id, "user_id": user_id, "currency": currency }),
        ),
        DomainEvent::DepositCompleted {
            deposit_id,
            account_id,
            amount,
            currency,
        } => (
            hooks::DEPOSIT_COMPLETED,
            json!({
                "deposit_id": deposit_id,
                "account_id": account_id,
                "amount": amount,
                "currency": currency,
            }),
        ),
        DomainEvent::DepositFailed {
            deposit_id,
            account_id,
            amount,
            currency,
            reason,
        } => (
            hooks::DEPOSIT_FAILED,
            json!({
                "deposit_id": deposit_id,
                "account_id": account_id,
                "amount": amount,
                "currency": currency,
                "reason": reason,
            }),
        ),
        DomainEvent::WithdrawalCompleted {
            withdrawal_id,
            account_id,
            amount,
            currency,
        } => (
            hooks::WITHDRAWAL_COMPLETED,
            json!({
                "withdrawal_id": withdrawal_id,
                "account_id": account_id,
                "amount": amount,
                "currency": currency,
            }),
        ),
        DomainEvent::TransferCompleted {
            transfer_id,
            from_account_id,
            to_account_id,
            amount,
            currency,
        } => (
            hooks::TRANSFER_COMPLETED,
            json!({
                "transfer_id": transfer_id,
                "from_account_id": from_account_id,
                "to_account_id": to_account_id,
                "amount": amount,
                "currency": currency,
            }),
        ),
        DomainEvent::OrderPlaced {
            order_id,
            user_id,
            market,
            side,
            price,
            quantity,
        } => (
            hooks::ORDER_PLACED,
            json!({
                "order_id": order_id,
                "user_id": user_id,
                "market": market,
                "side": side,
                "price": price,
                "quantity": quantity,
            }),
        ),
        DomainEvent::OrderMatched {
            trade_id,
            buy_order_id,
            sell_order_id,
            market,
            price,
            quantity,
        } => (
            hooks::ORDER_MATCHED,
            json!({
                "trade_id": trade_id,
                "buy_order_id": buy_order_id,
                "sell_order_id": sell_order_id,
                "market": market,
                "price": price,
                "quantity": quantity,
            }),
        ),
        DomainEvent::OrderCancelled {
            order_id,
            user_id,
            market,
        } => (
            hooks::ORDER_CANCELLED,
            json!({ "order_id": order_id, "user_id": user_id, "market": market }),
        ),
        DomainEvent::UserRegistered { user_id, email } => (
            hooks::USER_REGISTERED,
            json!({ "user_id": user_id, "email": email }),
        ),
        DomainEvent::UserLoggedIn {
            user_id,
            ip_address,
        } => (
            hooks::USER_LOGGED_IN,
            json!({ "user_id": user_id, "ip_address": ip_address }),
        ),
    }
}

/// Translates domain events into hook dispatches.
pub struct HookReactor {
    hooks: Arc<HookManager>,
}

impl HookReactor {
    /// Subscriber name used on the bus.
    pub const SUBSCRIBER: &'static str = "hook-reactor";

    pub fn new(hooks: Arc<HookManager>) -> Self {
        Self { hooks }
    }

    /// Subscribe a reactor for `hooks` to `bus`.
    pub async fn attach(bus: &EventBus, hooks: Arc<HookManager>) -> EventSubscription {
        bus.subscribe(Self::SUBSCRIBER, Arc::new(Self::new(hooks)))
            .await
    }
}

#[async_trait]
impl EventHandler for HookReactor {
    async fn handle(&self, event: &DomainEvent) -> crate::Result<()> {
        let (hook, payload) = hook_call_for(event);
        let summary = self.hooks.dispatch(hook, &payload).await;
        debug!(hook, invoked = summary.invoked, "Domain event reached hooks");
        Ok(())
    }

    fn event_types(&self) -> Vec<EventType> {
        vec![EventType::All]
    }
}
