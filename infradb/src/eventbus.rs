// SPDX-License-Identifier: Apache-2.0

//! Publish/subscribe fabric between the convergence engine and the back-end
//! modules.
//!
//! Each registered subscriber owns a bounded channel drained by a dedicated
//! worker task. Notifications carry no payload, only the object name and the
//! version/notification correlation tokens; a subscriber always re-reads the
//! object from InfraDB, so it can never act on stale data.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What a subscriber receives on its channel. The notification id is fresh
/// per publish and must be echoed back in the matching status update.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectData {
    pub name: String,
    pub resource_version: String,
    pub notification_id: String,
}

/// Contract implemented by every back-end module.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &str, data: ObjectData);
}

/// One `(module, event)` registration. Lower priority runs earlier in each
/// object's component pipeline; the order is fixed at registration time.
pub struct Subscriber {
    pub name: String,
    pub event: String,
    pub priority: u32,
    tx: mpsc::Sender<ObjectData>,
}

impl Subscriber {
    /// Enqueue a notification, blocking while the subscriber's channel is
    /// full so that back-pressure is visible to the caller. Returns false if
    /// the worker is gone.
    pub async fn notify(&self, data: ObjectData) -> bool {
        if self.tx.send(data).await.is_err() {
            warn!(
                "Subscriber '{}' for '{}' is gone, dropping notification",
                self.name, self.event
            );
            return false;
        }
        true
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("name", &self.name)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .finish()
    }
}

#[derive(Default)]
pub struct EventBus {
    /// event -> subscribers, ascending priority, registration order on ties
    subs: RwLock<HashMap<String, Vec<Arc<Subscriber>>>>,
    workers: Mutex<Vec<(String, String, JoinHandle<()>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and spawn its worker. The worker consumes the
    /// channel until the last sender is dropped, invoking the handler
    /// synchronously for each notification.
    pub fn start_subscriber(
        &self,
        name: &str,
        event: &str,
        priority: u32,
        channel_size: usize,
        handler: Arc<dyn EventHandler>,
    ) -> Arc<Subscriber> {
        let (tx, mut rx) = mpsc::channel::<ObjectData>(channel_size);
        let subscriber = Arc::new(Subscriber {
            name: name.to_string(),
            event: event.to_string(),
            priority,
            tx,
        });

        let worker_event = event.to_string();
        let worker_name = name.to_string();
        let handle = tokio::spawn(async move {
            while let Some(data) = rx.recv().await {
                handler.handle_event(&worker_event, data).await;
            }
            debug!("Worker of subscriber '{worker_name}' for '{worker_event}' exited");
        });

        let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
        let list = subs.entry(event.to_string()).or_default();
        let at = list.partition_point(|s| s.priority <= priority);
        list.insert(at, subscriber.clone());

        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name.to_string(), event.to_string(), handle));

        debug!("Started subscriber '{name}' for '{event}' with priority {priority}");
        subscriber
    }

    /// Subscribers for an event, in delivery (priority) order.
    pub fn subscribers(&self, event: &str) -> Vec<Arc<Subscriber>> {
        let subs = self.subs.read().unwrap_or_else(|e| e.into_inner());
        subs.get(event).cloned().unwrap_or_default()
    }

    /// Publish a notification to `subset` (all registered subscribers when
    /// `None`), in priority order. Blocks on any full channel.
    pub async fn publish(
        &self,
        event: &str,
        data: &ObjectData,
        subset: Option<&[Arc<Subscriber>]>,
    ) {
        let targets = match subset {
            Some(subset) => subset.to_vec(),
            None => self.subscribers(event),
        };
        for sub in targets {
            sub.notify(data.clone()).await;
        }
    }

    /// Deregister every subscription of a module, then wait for its workers
    /// to drain their channels and exit.
    pub async fn unsubscribe_module(&self, name: &str) {
        {
            let mut subs = self.subs.write().unwrap_or_else(|e| e.into_inner());
            for list in subs.values_mut() {
                list.retain(|s| s.name != name);
            }
        }
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            let (drained, kept) = workers.drain(..).partition(|(n, _, _)| n == name);
            *workers = kept;
            drained
        };
        for (_, event, handle) in handles {
            if handle.await.is_err() {
                warn!("Worker of module '{name}' for '{event}' panicked");
            }
        }
        debug!("Module '{name}' unsubscribed");
    }
}
