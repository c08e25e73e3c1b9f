// SPDX-License-Identifier: Apache-2.0

//! End-to-end convergence tests: intent goes in through the facade, a
//! scripted back end consumes the notifications and reports component
//! status, and the task manager drives every object to its goal state.

use async_trait::async_trait;
use infradb::actionbus::{ActionBus, ActionData, ActionHandler, PRE_REPLAY};
use infradb::eventbus::{EventBus, EventHandler, ObjectData};
use infradb::objects::bridge::LogicalBridgeSpecBuilder;
use infradb::objects::port::BridgePortSpecBuilder;
use infradb::objects::svi::SviSpecBuilder;
use infradb::objects::vrf::VrfSpecBuilder;
use infradb::objects::{
    BridgePortType, CompStatus, Component, ObjectType, OperStatus, SviSpec, VrfSpec, GRD_VRF,
};
use infradb::store::MemStore;
use infradb::taskmanager::TaskManager;
use infradb::{InfraDb, InfraError};
use macaddr::MacAddr6;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

const BACKEND: &str = "frr";

/// A scripted back end honoring the subscriber contract: re-fetch, verify
/// the version, report exactly one component status per notification.
/// Failure injection is per event type; observed error timers are recorded
/// so the escalation sequence can be asserted. Notifications carry a
/// sequence number from a shared counter so cross-module ordering can be
/// asserted too.
struct TestBackEnd {
    name: String,
    seq: Arc<AtomicUsize>,
    db: OnceLock<Arc<InfraDb>>,
    failing: Mutex<HashSet<String>>,
    notifications: Mutex<Vec<(usize, String, String)>>,
    error_timers: Mutex<Vec<Duration>>,
}

impl TestBackEnd {
    fn new(name: &str, seq: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            seq,
            db: OnceLock::new(),
            failing: Mutex::new(HashSet::new()),
            notifications: Mutex::new(Vec::new()),
            error_timers: Mutex::new(Vec::new()),
        })
    }

    fn fail_on(&self, event: &str) {
        self.failing.lock().unwrap().insert(event.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn notified(&self, event: &str) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e, _)| e == event)
            .count()
    }

    /// Sequence numbers of the notifications seen for one object.
    fn sequence(&self, object: &str) -> Vec<usize> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, name)| name == object)
            .map(|(seq, _, _)| *seq)
            .collect()
    }

    fn timers(&self) -> Vec<u64> {
        self.error_timers
            .lock()
            .unwrap()
            .iter()
            .map(Duration::as_secs)
            .collect()
    }

    fn outcome(&self, event: &str, prior: Option<&Component>) -> Component {
        if self.failing.lock().unwrap().contains(event) {
            let mut component = prior
                .cloned()
                .unwrap_or_else(|| Component::pending(&self.name));
            component.status = CompStatus::Error;
            component.details = "injected failure".to_string();
            component.bump_timer();
            self.error_timers.lock().unwrap().push(component.timer);
            component
        } else {
            Component::success(&self.name)
        }
    }
}

#[async_trait]
impl EventHandler for TestBackEnd {
    async fn handle_event(&self, event: &str, data: ObjectData) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.notifications
            .lock()
            .unwrap()
            .push((seq, event.to_string(), data.name.clone()));
        let db = self.db.get().expect("backend not wired").clone();

        match event {
            "vrf" => {
                let Ok(vrf) = db.get_vrf(&data.name) else {
                    return;
                };
                let component = self.outcome(event, vrf.status.component(&self.name));
                let _ = db.update_vrf_status(
                    &data.name,
                    &data.resource_version,
                    &data.notification_id,
                    None,
                    component,
                );
            }
            "logical-bridge" => {
                let Ok(bridge) = db.get_logical_bridge(&data.name) else {
                    return;
                };
                let component = self.outcome(event, bridge.status.component(&self.name));
                let _ = db.update_logical_bridge_status(
                    &data.name,
                    &data.resource_version,
                    &data.notification_id,
                    component,
                );
            }
            "bridge-port" => {
                let Ok(port) = db.get_bridge_port(&data.name) else {
                    return;
                };
                let component = self.outcome(event, port.status.component(&self.name));
                let _ = db.update_bridge_port_status(
                    &data.name,
                    &data.resource_version,
                    &data.notification_id,
                    None,
                    component,
                );
            }
            "svi" => {
                let Ok(svi) = db.get_svi(&data.name) else {
                    return;
                };
                let component = self.outcome(event, svi.status.component(&self.name));
                let _ = db.update_svi_status(
                    &data.name,
                    &data.resource_version,
                    &data.notification_id,
                    component,
                );
            }
            other => panic!("unexpected event '{other}'"),
        }
    }
}

/// Counts preReplay broadcasts.
struct ReplayProbe {
    seen: AtomicUsize,
}

#[async_trait]
impl ActionHandler for ReplayProbe {
    async fn handle_action(&self, action: &str, data: ActionData) {
        assert_eq!(action, PRE_REPLAY);
        self.seen.fetch_add(1, Ordering::SeqCst);
        let _ = data.err_tx.send(Ok(())).await;
    }
}

struct Harness {
    db: Arc<InfraDb>,
    backend: Arc<TestBackEnd>,
    replays: Arc<ReplayProbe>,
}

fn harness() -> Harness {
    let bus = Arc::new(EventBus::new());
    let actions = Arc::new(ActionBus::new());
    let tasks = Arc::new(TaskManager::new());
    let db = Arc::new(InfraDb::new(
        Arc::new(MemStore::new()),
        bus.clone(),
        actions.clone(),
        tasks.clone(),
    ));

    let backend = TestBackEnd::new(BACKEND, Arc::new(AtomicUsize::new(0)));
    backend.db.set(db.clone()).ok().expect("fresh backend");
    for event in ["vrf", "logical-bridge", "bridge-port", "svi"] {
        bus.start_subscriber(BACKEND, event, 1, 16, backend.clone());
    }

    let replays = Arc::new(ReplayProbe {
        seen: AtomicUsize::new(0),
    });
    actions.subscribe("probe", PRE_REPLAY, replays.clone());

    tasks.set_driver(db.clone());
    tasks.start();

    Harness {
        db,
        backend,
        replays,
    }
}

/// Two back ends on one kind: notifications run in priority order and the
/// later component is contacted only once the earlier one succeeded.
#[tokio::test]
async fn test_pipeline_runs_in_priority_order() {
    let bus = Arc::new(EventBus::new());
    let actions = Arc::new(ActionBus::new());
    let tasks = Arc::new(TaskManager::new());
    let db = Arc::new(InfraDb::new(
        Arc::new(MemStore::new()),
        bus.clone(),
        actions,
        tasks.clone(),
    ));

    let seq = Arc::new(AtomicUsize::new(0));
    let lgm = TestBackEnd::new("lgm", seq.clone());
    let frr = TestBackEnd::new("frr", seq);
    lgm.db.set(db.clone()).ok().expect("fresh backend");
    frr.db.set(db.clone()).ok().expect("fresh backend");
    // registered against priority order on purpose
    bus.start_subscriber("frr", "vrf", 2, 16, frr.clone());
    bus.start_subscriber("lgm", "vrf", 1, 16, lgm.clone());

    tasks.set_driver(db.clone());
    tasks.start();

    let name = vrf_name("v1");
    let created = db.create_vrf(&name, VrfSpec::default()).unwrap();
    assert_eq!(
        created
            .status
            .components
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>(),
        vec!["lgm".to_string(), "frr".to_string()]
    );

    let watched = name.clone();
    let db2 = db.clone();
    wait_until("vrf up with two components", move || {
        db2.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;

    let first = lgm.sequence(&name);
    let second = frr.sequence(&name);
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert!(first[0] < second[0], "lgm must run before frr");
}

async fn wait_until_for(what: &str, ticks: usize, mut condition: impl FnMut() -> bool) {
    for _ in 0..ticks {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

async fn wait_until(what: &str, condition: impl FnMut() -> bool) {
    wait_until_for(what, 2000, condition).await;
}

fn vrf_name(id: &str) -> String {
    ObjectType::Vrf.resource_name(id)
}
fn bridge_name(id: &str) -> String {
    ObjectType::LogicalBridge.resource_name(id)
}
fn svi_name(id: &str) -> String {
    ObjectType::Svi.resource_name(id)
}

fn mac(last: u8) -> MacAddr6 {
    MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, last)
}

fn svi_spec(vrf: &str, bridge: &str, last: u8) -> SviSpec {
    SviSpecBuilder::default()
        .vrf(vrf.to_string())
        .logical_bridge(bridge.to_string())
        .mac_address(mac(last))
        .enable_bgp(true)
        .remote_as(Some(65000))
        .build()
        .unwrap()
}

/// S1: two identical creates return the same stored object, enqueue one
/// task, and the subscriber is notified exactly once.
#[tokio::test]
async fn test_idempotent_vrf_create() {
    let h = harness();
    let name = vrf_name("v1");
    let spec = VrfSpecBuilder::default().vni(Some(100)).build().unwrap();

    let first = h.db.create_vrf(&name, spec.clone()).unwrap();
    let second = h.db.create_vrf(&name, spec).unwrap();
    assert_eq!(first.resource_version, second.resource_version);

    // one component per registered subscriber, in priority order
    assert_eq!(first.status.components.len(), 1);
    assert_eq!(first.status.components[0].name, BACKEND);

    let db = h.db.clone();
    wait_until("vrf v1 up", move || {
        db.get_vrf(&name).unwrap().status.oper == OperStatus::Up
    })
    .await;
    assert_eq!(h.backend.notified("vrf"), 1);

    // oper Up implies every component succeeded
    let stored = h.db.get_vrf(&vrf_name("v1")).unwrap();
    assert!(stored.status.all_success());
}

/// S2: an SVI referencing a missing bridge is rejected before anything is
/// persisted.
#[tokio::test]
async fn test_svi_without_bridge_rejected() {
    let h = harness();
    let vrf = vrf_name("v1");
    h.db.create_vrf(&vrf, VrfSpec::default()).unwrap();

    let result = h
        .db
        .create_svi(&svi_name("s1"), svi_spec(&vrf, &bridge_name("lb9"), 1));
    assert_eq!(
        result.unwrap_err(),
        InfraError::ReferenceNotFound(bridge_name("lb9"))
    );
    assert!(h.db.list_svis().unwrap().is_empty());
    assert!(h.db.get_vrf(&vrf).unwrap().svis.is_empty());
    assert_eq!(h.backend.notified("svi"), 0);
}

/// S3: a logical bridge accepts a single SVI.
#[tokio::test]
async fn test_second_svi_on_bridge_rejected() {
    let h = harness();
    let vrf = vrf_name("v1");
    let bridge = bridge_name("lb9");
    h.db.create_vrf(&vrf, VrfSpec::default()).unwrap();
    h.db.create_logical_bridge(
        &bridge,
        LogicalBridgeSpecBuilder::default()
            .vlan_id(22u32)
            .build()
            .unwrap(),
    )
    .unwrap();
    h.db.create_svi(&svi_name("s1"), svi_spec(&vrf, &bridge, 1))
        .unwrap();

    let result = h
        .db
        .create_svi(&svi_name("s2"), svi_spec(&vrf, &bridge, 2));
    assert!(matches!(result, Err(InfraError::ReferenceConflict(_))));

    // the loser left no trace on either side
    let stored = h.db.get_logical_bridge(&bridge).unwrap();
    assert_eq!(stored.svi, Some(svi_name("s1")));
    assert_eq!(h.db.get_vrf(&vrf).unwrap().svis.len(), 1);
}

/// S4: a VRF with a dependent SVI cannot be deleted and keeps its status.
#[tokio::test]
async fn test_delete_vrf_with_dependents() {
    let h = harness();
    let vrf = vrf_name("v1");
    let bridge = bridge_name("lb9");
    h.db.create_vrf(&vrf, VrfSpec::default()).unwrap();
    h.db.create_logical_bridge(
        &bridge,
        LogicalBridgeSpecBuilder::default()
            .vlan_id(22u32)
            .build()
            .unwrap(),
    )
    .unwrap();
    h.db.create_svi(&svi_name("s1"), svi_spec(&vrf, &bridge, 1))
        .unwrap();

    let db = h.db.clone();
    let watched = vrf.clone();
    wait_until("vrf v1 up", move || {
        db.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;

    let before = h.db.get_vrf(&vrf).unwrap();
    assert_eq!(
        h.db.delete_vrf(&vrf).unwrap_err(),
        InfraError::HasDependents(vrf.clone())
    );
    let after = h.db.get_vrf(&vrf).unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.resource_version, before.resource_version);
}

/// The GRD VRF never goes away.
#[tokio::test]
async fn test_grd_vrf_cannot_be_deleted() {
    let h = harness();
    h.db.create_vrf(GRD_VRF, VrfSpec::default()).unwrap();
    assert!(matches!(
        h.db.delete_vrf(GRD_VRF),
        Err(InfraError::Forbidden(_))
    ));
}

/// S5: per-component exponential backoff 2,4,8,16,32,64 seconds, then the
/// replay threshold escalates globally: preReplay is broadcast and every
/// object whose pipeline involves the failing component is re-driven.
#[tokio::test(start_paused = true)]
async fn test_component_retry_and_replay_escalation() {
    let h = harness();
    let vrf = vrf_name("v1");
    let bridge = bridge_name("lb1");

    // a healthy bridge that converges immediately
    h.db.create_logical_bridge(
        &bridge,
        LogicalBridgeSpecBuilder::default()
            .vlan_id(22u32)
            .build()
            .unwrap(),
    )
    .unwrap();
    let db = h.db.clone();
    let watched = bridge.clone();
    wait_until("bridge up", move || {
        db.get_logical_bridge(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;

    // a vrf whose back end keeps failing
    h.backend.fail_on("vrf");
    h.db.create_vrf(&vrf, VrfSpec::default()).unwrap();

    // the escalation spans 2+4+...+64 virtual seconds; time is paused, so
    // the generous tick budget costs nothing in real time
    let replays = h.replays.clone();
    wait_until_for("replay triggered", 60_000, move || {
        replays.seen.load(Ordering::SeqCst) >= 1
    })
    .await;

    // escalation clock doubled from seed to threshold
    let timers = h.backend.timers();
    assert!(timers.len() >= 6, "got timers {timers:?}");
    assert_eq!(&timers[..6], &[2, 4, 8, 16, 32, 64]);

    // replay re-drives the failed vrf and the healthy bridge alike (its
    // pipeline contains the failing component)
    let bridge_notifications = h.backend.notified("logical-bridge");
    assert!(bridge_notifications >= 2, "bridge was not re-driven");

    // once the back end heals, the replayed intent converges
    h.backend.heal();
    let db = h.db.clone();
    let watched = vrf.clone();
    wait_until("vrf up after replay", move || {
        db.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;
    let db = h.db.clone();
    let watched = bridge.clone();
    wait_until("bridge up after replay", move || {
        db.get_logical_bridge(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;
}

/// S6: an update that changes nothing returns the stored object, keeps the
/// resource version and enqueues no task.
#[tokio::test]
async fn test_noop_update_collapses() {
    let h = harness();
    let name = vrf_name("v1");
    let spec = VrfSpecBuilder::default().vni(Some(100)).build().unwrap();
    let created = h.db.create_vrf(&name, spec.clone()).unwrap();

    let db = h.db.clone();
    let watched = name.clone();
    wait_until("vrf up", move || {
        db.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;
    let notified = h.backend.notified("vrf");

    let updated = h.db.update_vrf(&name, spec, None).unwrap();
    assert_eq!(updated.resource_version, created.resource_version);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.backend.notified("vrf"), notified);
    assert_eq!(
        h.db.get_vrf(&name).unwrap().status.oper,
        OperStatus::Up
    );
}

/// S7: optimistic concurrency between two writers: the loser observes a
/// version mismatch and succeeds on retry; the version history stays
/// strictly monotonic with no lost write.
#[tokio::test]
async fn test_concurrent_writers() {
    let h = harness();
    let name = vrf_name("v1");
    h.db.create_vrf(&name, VrfSpec::default()).unwrap();
    let base = h.db.get_vrf(&name).unwrap();

    let spec_a = VrfSpecBuilder::default().vni(Some(100)).build().unwrap();
    let spec_b = VrfSpecBuilder::default().vni(Some(200)).build().unwrap();

    let winner = h
        .db
        .update_vrf(&name, spec_a.clone(), Some(&base.resource_version))
        .unwrap();
    assert_ne!(winner.resource_version, base.resource_version);

    // the second writer raced and loses
    let lost = h
        .db
        .update_vrf(&name, spec_b.clone(), Some(&base.resource_version));
    assert_eq!(
        lost.unwrap_err(),
        InfraError::VersionMismatch(name.clone())
    );

    // a retry against a fresh read wins; nothing was lost in between
    let fresh = h.db.get_vrf(&name).unwrap();
    assert_eq!(fresh.spec, spec_a);
    let retried = h
        .db
        .update_vrf(&name, spec_b.clone(), Some(&fresh.resource_version))
        .unwrap();
    assert_eq!(retried.spec, spec_b);

    let versions = [
        base.resource_version,
        winner.resource_version,
        retried.resource_version,
    ];
    let unique: std::collections::BTreeSet<_> = versions.iter().collect();
    assert_eq!(unique.len(), versions.len());
}

/// Full two-phase delete across the reference graph: rows disappear only
/// after tear-down converges, and every reverse reference is unhooked.
#[tokio::test]
async fn test_teardown_cleans_references() {
    let h = harness();
    let vrf = vrf_name("v1");
    let bridge = bridge_name("lb9");
    let svi = svi_name("s1");
    let port = ObjectType::BridgePort.resource_name("p0");

    h.db.create_vrf(&vrf, VrfSpec::default()).unwrap();
    h.db.create_logical_bridge(
        &bridge,
        LogicalBridgeSpecBuilder::default()
            .vlan_id(22u32)
            .build()
            .unwrap(),
    )
    .unwrap();
    h.db.create_svi(&svi, svi_spec(&vrf, &bridge, 1)).unwrap();
    h.db.create_bridge_port(
        &port,
        BridgePortSpecBuilder::default()
            .ptype(BridgePortType::Access)
            .mac_address(mac(9))
            .logical_bridges(vec![bridge.clone()])
            .build()
            .unwrap(),
    )
    .unwrap();

    // invariant: both sides of every reference are in place
    let stored = h.db.get_logical_bridge(&bridge).unwrap();
    assert_eq!(stored.svi, Some(svi.clone()));
    assert!(stored.bridge_ports.contains(&port));
    assert_eq!(stored.mac_table.len(), 1);

    let db = h.db.clone();
    let watched = svi.clone();
    wait_until("svi up", move || {
        db.get_svi(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;

    // bridge is pinned by the svi and the port
    assert!(matches!(
        h.db.delete_logical_bridge(&bridge),
        Err(InfraError::HasDependents(_))
    ));

    h.db.delete_svi(&svi).unwrap();
    let db = h.db.clone();
    let watched = svi.clone();
    wait_until("svi removed", move || {
        matches!(db.get_svi(&watched), Err(InfraError::NotFound(_)))
    })
    .await;
    assert!(h.db.get_vrf(&vrf).unwrap().svis.is_empty());
    assert_eq!(h.db.get_logical_bridge(&bridge).unwrap().svi, None);

    h.db.delete_bridge_port(&port).unwrap();
    let db = h.db.clone();
    let watched = port.clone();
    wait_until("port removed", move || {
        matches!(db.get_bridge_port(&watched), Err(InfraError::NotFound(_)))
    })
    .await;
    let stored = h.db.get_logical_bridge(&bridge).unwrap();
    assert!(stored.bridge_ports.is_empty());
    assert!(stored.mac_table.is_empty());

    // with the dependents gone the bridge and the vrf can leave too
    h.db.delete_logical_bridge(&bridge).unwrap();
    h.db.delete_vrf(&vrf).unwrap();
    let db = h.db.clone();
    wait_until("all rows removed", move || {
        db.list_logical_bridges().unwrap().is_empty() && db.list_vrfs().unwrap().is_empty()
    })
    .await;
}

/// A spec update resets the pipeline, bumps the version and re-drives the
/// subscribers; the object converges back to Up.
#[tokio::test]
async fn test_update_redrives_pipeline() {
    let h = harness();
    let name = vrf_name("v1");
    h.db.create_vrf(&name, VrfSpec::default()).unwrap();

    let db = h.db.clone();
    let watched = name.clone();
    wait_until("vrf up", move || {
        db.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;

    let spec = VrfSpecBuilder::default().vni(Some(300)).build().unwrap();
    let updated = h.db.update_vrf(&name, spec, None).unwrap();
    assert_eq!(updated.status.oper, OperStatus::Down);
    assert!(!updated.old_versions.is_empty());

    let db = h.db.clone();
    let watched = name.clone();
    wait_until("vrf up again", move || {
        db.get_vrf(&watched).unwrap().status.oper == OperStatus::Up
    })
    .await;
    // convergence clears the supersession trail
    assert!(h.db.get_vrf(&name).unwrap().old_versions.is_empty());
    assert_eq!(h.backend.notified("vrf"), 2);
}
