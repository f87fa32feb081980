//! Hook dispatch with per-listener fault isolation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error, warn};

use super::registry::HookManager;
use super::types::{DispatchSummary, HookListener, ListenerId};
use crate::PluginError;

impl HookManager {
    /// Invoke every listener of `hook` in priority order.
    ///
    /// Runs against a snapshot, so listeners may register or unregister
    /// during dispatch without affecting the current call. A listener that
    /// returns an error, panics or exceeds the timeout is logged and counted;
    /// the remaining listeners still run and nothing is propagated.
    pub async fn dispatch(&self, hook: &str, payload: &serde_json::Value) -> DispatchSummary {
        let snapshot: Vec<(ListenerId, Arc<dyn HookListener>)> = {
            let listeners = self.listeners.read().await;
            match listeners.get(hook) {
                Some(entries) if !entries.is_empty() => entries
                    .iter()
                    .map(|r| (r.id, Arc::clone(&r.listener)))
                    .collect(),
                _ => return DispatchSummary::default(),
            }
        };

        let mut summary = DispatchSummary::default();
        for (id, listener) in snapshot {
            summary.invoked += 1;

            let call = AssertUnwindSafe(listener.handle(payload)).catch_unwind();
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        let e = PluginError::Timeout(format!(
                            "listener {} on '{}' after {}ms",
                            id,
                            hook,
                            limit.as_millis()
                        ));
                        warn!(hook, listener = %id, error = %e, "Hook listener timed out");
                        summary.failed += 1;
                        continue;
                    }
                },
                None => call.await,
            };

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(hook, listener = %id, error = %e, "Hook listener failed");
                    summary.failed += 1;
                }
                Err(cause) => {
                    error!(
                        hook,
                        listener = %id,
                        panic = panic_message(cause.as_ref()),
                        "Hook listener panicked"
                    );
                    summary.failed += 1;
                }
            }
        }

        debug!(
            hook,
            invoked = summary.invoked,
            failed = summary.failed,
            "Hook dispatched"
        );
        summary
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
