// SPDX-License-Identifier: Apache-2.0

//! One-shot synchronous broadcast to the back-end modules.
//!
//! Unlike the event bus, an action is executed in the caller's task and the
//! caller waits for every module's acknowledgement before moving on. The one
//! action today is `preReplay`: the routing daemon must be restarted on a
//! clean configuration before the persisted intent is re-driven.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Name of the action published before a global replay.
pub const PRE_REPLAY: &str = "preReplay";

/// Handed to each action handler; the handler must send exactly one value
/// on `err_tx` to acknowledge (or fail) the action.
pub struct ActionData {
    pub err_tx: mpsc::Sender<Result<(), String>>,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle_action(&self, action: &str, data: ActionData);
}

struct ActionSubscriber {
    name: String,
    handler: Arc<dyn ActionHandler>,
}

#[derive(Default)]
pub struct ActionBus {
    subs: RwLock<HashMap<String, Vec<ActionSubscriber>>>,
}

impl ActionBus {
    /// How long to wait for one module to acknowledge an action.
    const ACK_TIMEOUT: Duration = Duration::from_secs(40);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, name: &str, action: &str, handler: Arc<dyn ActionHandler>) {
        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        subs.entry(action.to_string()).or_default().push(ActionSubscriber {
            name: name.to_string(),
            handler,
        });
        debug!("Module '{name}' subscribed to action '{action}'");
    }

    /// Run the action on every subscribed module sequentially, awaiting each
    /// acknowledgement. Returns the per-module outcomes in execution order.
    pub async fn publish(&self, action: &str) -> Vec<(String, Result<(), String>)> {
        let targets: Vec<(String, Arc<dyn ActionHandler>)> = {
            let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
            subs.get(action)
                .map(|list| {
                    list.iter()
                        .map(|s| (s.name.clone(), s.handler.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut results = Vec::with_capacity(targets.len());
        for (name, handler) in targets {
            let (err_tx, mut err_rx) = mpsc::channel(1);
            handler.handle_action(action, ActionData { err_tx }).await;
            let outcome = match tokio::time::timeout(Self::ACK_TIMEOUT, err_rx.recv()).await {
                Ok(Some(result)) => result,
                Ok(None) => Err("handler dropped the acknowledgement channel".to_string()),
                Err(_) => {
                    warn!("Module '{name}' did not acknowledge action '{action}' in time");
                    Err("acknowledgement timeout".to_string())
                }
            };
            results.push((name, outcome));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Acker {
        fail: bool,
    }

    #[async_trait]
    impl ActionHandler for Acker {
        async fn handle_action(&self, _action: &str, data: ActionData) {
            let result = if self.fail {
                Err("could not restart daemon".to_string())
            } else {
                Ok(())
            };
            let _ = data.err_tx.send(result).await;
        }
    }

    #[tokio::test]
    async fn test_publish_collects_acknowledgements() {
        let bus = ActionBus::new();
        bus.subscribe("frr", PRE_REPLAY, Arc::new(Acker { fail: false }));
        bus.subscribe("vendor", PRE_REPLAY, Arc::new(Acker { fail: true }));

        let results = bus.publish(PRE_REPLAY).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], ("frr".to_string(), Ok(())));
        assert_eq!(results[1].0, "vendor");
        assert!(results[1].1.is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = ActionBus::new();
        assert!(bus.publish(PRE_REPLAY).await.is_empty());
    }
}
