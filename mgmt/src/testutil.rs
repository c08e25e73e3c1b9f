// SPDX-License-Identifier: Apache-2.0

//! Facade wiring shared by the service tests

use infradb::actionbus::ActionBus;
use infradb::eventbus::{EventBus, EventHandler, ObjectData};
use infradb::store::MemStore;
use infradb::taskmanager::TaskManager;
use infradb::InfraDb;
use std::sync::Arc;

struct Sink;

#[async_trait::async_trait]
impl EventHandler for Sink {
    async fn handle_event(&self, _event: &str, _data: ObjectData) {}
}

/// An InfraDB over a memory store with one inert subscriber per kind, so
/// object creation can shape its component vector. The task manager is not
/// running; these tests only exercise the ingress path.
pub(crate) fn test_db() -> Arc<InfraDb> {
    let bus = Arc::new(EventBus::new());
    for event in ["vrf", "logical-bridge", "bridge-port", "svi"] {
        bus.start_subscriber("sink", event, 1, 8, Arc::new(Sink));
    }
    Arc::new(InfraDb::new(
        Arc::new(MemStore::new()),
        bus,
        Arc::new(ActionBus::new()),
        Arc::new(TaskManager::new()),
    ))
}
