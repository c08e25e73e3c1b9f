// SPDX-License-Identifier: Apache-2.0

//! The transactional facade over the object store.
//!
//! All intent enters here. Writes of one kind are serialized by that kind's
//! lock; operations touching several kinds take the locks in the fixed
//! global order Vrf < LogicalBridge < BridgePort < Svi, so cross-kind
//! reference checks can never deadlock. After a successful persist the
//! caller is done: back-end failures never surface here, they live in the
//! object's component vector and drive the retry/replay loop.

use crate::actionbus::{ActionBus, PRE_REPLAY};
use crate::error::{InfraError, InfraResult};
use crate::eventbus::{EventBus, Subscriber};
use crate::objects::common::{generate_version, Component, OperStatus};
use crate::objects::port::BridgePortMetadata;
use crate::objects::vrf::VrfMetadata;
use crate::objects::{
    BridgePort, BridgePortSpec, InfraObject, LogicalBridge, LogicalBridgeSpec, ObjectType, Svi,
    SviSpec, Vrf, VrfSpec,
};
use crate::store::ObjectStore;
use crate::taskmanager::{ReplayDriver, TaskManager, TaskStatus};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

pub struct InfraDb {
    store: Arc<dyn ObjectStore>,
    bus: Arc<EventBus>,
    actions: Arc<ActionBus>,
    tasks: Arc<TaskManager>,
    vrf_lock: Mutex<()>,
    bridge_lock: Mutex<()>,
    port_lock: Mutex<()>,
    svi_lock: Mutex<()>,
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl InfraDb {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<EventBus>,
        actions: Arc<ActionBus>,
        tasks: Arc<TaskManager>,
    ) -> Self {
        Self {
            store,
            bus,
            actions,
            tasks,
            vrf_lock: Mutex::new(()),
            bridge_lock: Mutex::new(()),
            port_lock: Mutex::new(()),
            svi_lock: Mutex::new(()),
        }
    }

    fn kind_lock(&self, kind: ObjectType) -> &Mutex<()> {
        match kind {
            ObjectType::Vrf => &self.vrf_lock,
            ObjectType::LogicalBridge => &self.bridge_lock,
            ObjectType::BridgePort => &self.port_lock,
            ObjectType::Svi => &self.svi_lock,
        }
    }

    /* ------------------------------------------------------------------ */
    /* store plumbing                                                      */
    /* ------------------------------------------------------------------ */

    fn load<O: InfraObject>(&self, name: &str) -> InfraResult<Option<O>> {
        let Some(bytes) = self.store.get(name)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|_| InfraError::Internal("corrupt object in store"))
    }

    fn persist<O: InfraObject>(&self, object: &O) -> InfraResult<()> {
        let bytes = serde_json::to_vec(object)
            .map_err(|_| InfraError::Internal("object serialization failed"))?;
        self.store.set(object.name(), &bytes)?;
        Ok(())
    }

    /// Extant names of a kind, from the kind's sentinel key.
    fn names(&self, kind: ObjectType) -> InfraResult<BTreeSet<String>> {
        let Some(bytes) = self.store.get(&kind.sentinel_key())? else {
            return Ok(BTreeSet::new());
        };
        serde_json::from_slice(&bytes)
            .map_err(|_| InfraError::Internal("corrupt name list in store"))
    }

    fn save_names(&self, kind: ObjectType, names: &BTreeSet<String>) -> InfraResult<()> {
        let bytes = serde_json::to_vec(names)
            .map_err(|_| InfraError::Internal("name list serialization failed"))?;
        self.store.set(&kind.sentinel_key(), &bytes)?;
        Ok(())
    }

    fn add_name(&self, kind: ObjectType, name: &str) -> InfraResult<()> {
        let mut names = self.names(kind)?;
        names.insert(name.to_string());
        self.save_names(kind, &names)
    }

    fn remove_name(&self, kind: ObjectType, name: &str) -> InfraResult<()> {
        let mut names = self.names(kind)?;
        names.remove(name);
        self.save_names(kind, &names)
    }

    fn subscribers(&self, kind: ObjectType) -> InfraResult<Vec<Arc<Subscriber>>> {
        let subs = self.bus.subscribers(kind.event());
        if subs.is_empty() {
            return Err(InfraError::NoSubscribers(kind.event()));
        }
        Ok(subs)
    }

    /* ------------------------------------------------------------------ */
    /* VRF                                                                 */
    /* ------------------------------------------------------------------ */

    pub fn create_vrf(&self, name: &str, spec: VrfSpec) -> InfraResult<Vrf> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::Vrf)?;
        let _v = lock(&self.vrf_lock);
        if let Some(existing) = self.load::<Vrf>(name)? {
            debug!("Create of existing VRF '{name}' returns the stored object");
            return Ok(existing);
        }
        let vrf = Vrf::new(name, spec, &subs);
        self.persist(&vrf)?;
        self.add_name(ObjectType::Vrf, name)?;
        self.tasks
            .create_task(ObjectType::Vrf, name, &vrf.resource_version, subs);
        info!("Created VRF '{name}'");
        Ok(vrf)
    }

    pub fn get_vrf(&self, name: &str) -> InfraResult<Vrf> {
        let _v = lock(&self.vrf_lock);
        self.load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))
    }

    pub fn update_vrf(
        &self,
        name: &str,
        spec: VrfSpec,
        expected_version: Option<&str>,
    ) -> InfraResult<Vrf> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::Vrf)?;
        let _v = lock(&self.vrf_lock);
        let mut vrf: Vrf = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if let Some(expected) = expected_version {
            if expected != vrf.resource_version {
                return Err(InfraError::VersionMismatch(name.to_string()));
            }
        }
        if vrf.spec == spec {
            debug!("Update of VRF '{name}' changes nothing");
            return Ok(vrf);
        }
        vrf.spec = spec;
        vrf.touch();
        self.persist(&vrf)?;
        self.tasks
            .create_task(ObjectType::Vrf, name, &vrf.resource_version, subs);
        info!("Updated VRF '{name}'");
        Ok(vrf)
    }

    pub fn delete_vrf(&self, name: &str) -> InfraResult<()> {
        let subs = self.subscribers(ObjectType::Vrf)?;
        let _v = lock(&self.vrf_lock);
        let mut vrf: Vrf = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if vrf.is_grd() {
            return Err(InfraError::Forbidden("the GRD VRF cannot be deleted"));
        }
        if vrf.has_dependents() {
            return Err(InfraError::HasDependents(name.to_string()));
        }
        self.mark_for_deletion(&mut vrf);
        self.persist(&vrf)?;
        self.tasks
            .create_task(ObjectType::Vrf, name, &vrf.resource_version, subs);
        info!("VRF '{name}' marked for deletion");
        Ok(())
    }

    pub fn list_vrfs(&self) -> InfraResult<Vec<Vrf>> {
        let _v = lock(&self.vrf_lock);
        self.list_objects()
    }

    /// Component status report for a VRF, optionally carrying back-end
    /// derived metadata (routing table ids, RD, router MAC).
    pub fn update_vrf_status(
        &self,
        name: &str,
        version: &str,
        notification_id: &str,
        metadata: Option<VrfMetadata>,
        component: Component,
    ) -> InfraResult<()> {
        let _v = lock(&self.vrf_lock);
        self.apply_status::<Vrf>(
            name,
            version,
            notification_id,
            component,
            |vrf| {
                if let Some(metadata) = metadata {
                    vrf.metadata = metadata;
                }
            },
            |_, _| Ok(()),
        )
    }

    /* ------------------------------------------------------------------ */
    /* Logical bridge                                                      */
    /* ------------------------------------------------------------------ */

    pub fn create_logical_bridge(
        &self,
        name: &str,
        spec: LogicalBridgeSpec,
    ) -> InfraResult<LogicalBridge> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::LogicalBridge)?;
        let _b = lock(&self.bridge_lock);
        if let Some(existing) = self.load::<LogicalBridge>(name)? {
            debug!("Create of existing logical bridge '{name}' returns the stored object");
            return Ok(existing);
        }
        let bridge = LogicalBridge::new(name, spec, &subs);
        self.persist(&bridge)?;
        self.add_name(ObjectType::LogicalBridge, name)?;
        self.tasks.create_task(
            ObjectType::LogicalBridge,
            name,
            &bridge.resource_version,
            subs,
        );
        info!("Created logical bridge '{name}'");
        Ok(bridge)
    }

    pub fn get_logical_bridge(&self, name: &str) -> InfraResult<LogicalBridge> {
        let _b = lock(&self.bridge_lock);
        self.load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))
    }

    pub fn update_logical_bridge(
        &self,
        name: &str,
        spec: LogicalBridgeSpec,
        expected_version: Option<&str>,
    ) -> InfraResult<LogicalBridge> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::LogicalBridge)?;
        let _b = lock(&self.bridge_lock);
        let mut bridge: LogicalBridge = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if let Some(expected) = expected_version {
            if expected != bridge.resource_version {
                return Err(InfraError::VersionMismatch(name.to_string()));
            }
        }
        if bridge.spec == spec {
            debug!("Update of logical bridge '{name}' changes nothing");
            return Ok(bridge);
        }
        bridge.spec = spec;
        bridge.touch();
        self.persist(&bridge)?;
        self.tasks.create_task(
            ObjectType::LogicalBridge,
            name,
            &bridge.resource_version,
            subs,
        );
        info!("Updated logical bridge '{name}'");
        Ok(bridge)
    }

    pub fn delete_logical_bridge(&self, name: &str) -> InfraResult<()> {
        let subs = self.subscribers(ObjectType::LogicalBridge)?;
        let _b = lock(&self.bridge_lock);
        let mut bridge: LogicalBridge = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if bridge.has_dependents() {
            return Err(InfraError::HasDependents(name.to_string()));
        }
        self.mark_for_deletion(&mut bridge);
        self.persist(&bridge)?;
        self.tasks.create_task(
            ObjectType::LogicalBridge,
            name,
            &bridge.resource_version,
            subs,
        );
        info!("Logical bridge '{name}' marked for deletion");
        Ok(())
    }

    pub fn list_logical_bridges(&self) -> InfraResult<Vec<LogicalBridge>> {
        let _b = lock(&self.bridge_lock);
        self.list_objects()
    }

    pub fn update_logical_bridge_status(
        &self,
        name: &str,
        version: &str,
        notification_id: &str,
        component: Component,
    ) -> InfraResult<()> {
        let _b = lock(&self.bridge_lock);
        self.apply_status::<LogicalBridge>(
            name,
            version,
            notification_id,
            component,
            |_| {},
            |_, _| Ok(()),
        )
    }

    /* ------------------------------------------------------------------ */
    /* Bridge port                                                         */
    /* ------------------------------------------------------------------ */

    pub fn create_bridge_port(&self, name: &str, spec: BridgePortSpec) -> InfraResult<BridgePort> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::BridgePort)?;
        let _b = lock(&self.bridge_lock);
        let _p = lock(&self.port_lock);
        if let Some(existing) = self.load::<BridgePort>(name)? {
            debug!("Create of existing bridge port '{name}' returns the stored object");
            return Ok(existing);
        }
        let port = BridgePort::new(name, spec, &subs);
        let mac = port.mac_string();

        // resolve and mutate the referenced bridges before anything is
        // persisted, so a conflict on any of them leaves no state behind
        let mut bridges = Vec::with_capacity(port.spec.logical_bridges.len());
        for bridge_name in &port.spec.logical_bridges {
            let bridge: LogicalBridge = self
                .load(bridge_name)?
                .ok_or_else(|| InfraError::ReferenceNotFound(bridge_name.clone()))?;
            bridges.push(bridge);
        }
        for bridge in &mut bridges {
            bridge.add_bridge_port(name, &mac)?;
        }
        for bridge in &bridges {
            self.persist(bridge)?;
        }

        self.persist(&port)?;
        self.add_name(ObjectType::BridgePort, name)?;
        self.tasks
            .create_task(ObjectType::BridgePort, name, &port.resource_version, subs);
        info!("Created bridge port '{name}'");
        Ok(port)
    }

    pub fn get_bridge_port(&self, name: &str) -> InfraResult<BridgePort> {
        let _p = lock(&self.port_lock);
        self.load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))
    }

    pub fn update_bridge_port(
        &self,
        name: &str,
        spec: BridgePortSpec,
        expected_version: Option<&str>,
    ) -> InfraResult<BridgePort> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::BridgePort)?;
        let _b = lock(&self.bridge_lock);
        let _p = lock(&self.port_lock);
        let mut port: BridgePort = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if let Some(expected) = expected_version {
            if expected != port.resource_version {
                return Err(InfraError::VersionMismatch(name.to_string()));
            }
        }
        if port.spec.logical_bridges != spec.logical_bridges {
            return Err(InfraError::InvalidArgument(
                "the bridge list of a port cannot be changed; delete and re-create".to_string(),
            ));
        }
        // the MAC is keyed into every attached bridge's mac table
        if port.spec.mac_address != spec.mac_address {
            return Err(InfraError::InvalidArgument(
                "the MAC of a port cannot be changed; delete and re-create".to_string(),
            ));
        }
        if port.spec == spec {
            debug!("Update of bridge port '{name}' changes nothing");
            return Ok(port);
        }
        port.spec = spec;
        port.touch();
        self.persist(&port)?;
        self.tasks
            .create_task(ObjectType::BridgePort, name, &port.resource_version, subs);
        info!("Updated bridge port '{name}'");
        Ok(port)
    }

    pub fn delete_bridge_port(&self, name: &str) -> InfraResult<()> {
        let subs = self.subscribers(ObjectType::BridgePort)?;
        let _b = lock(&self.bridge_lock);
        let _p = lock(&self.port_lock);
        let mut port: BridgePort = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        self.mark_for_deletion(&mut port);
        self.persist(&port)?;
        self.tasks
            .create_task(ObjectType::BridgePort, name, &port.resource_version, subs);
        info!("Bridge port '{name}' marked for deletion");
        Ok(())
    }

    pub fn list_bridge_ports(&self) -> InfraResult<Vec<BridgePort>> {
        let _p = lock(&self.port_lock);
        self.list_objects()
    }

    pub fn update_bridge_port_status(
        &self,
        name: &str,
        version: &str,
        notification_id: &str,
        metadata: Option<BridgePortMetadata>,
        component: Component,
    ) -> InfraResult<()> {
        let _b = lock(&self.bridge_lock);
        let _p = lock(&self.port_lock);
        self.apply_status::<BridgePort>(
            name,
            version,
            notification_id,
            component,
            |port| {
                if let Some(metadata) = metadata {
                    port.metadata = metadata;
                }
            },
            |db, port| {
                // detach from every bridge now that tear-down converged
                let mac = port.mac_string();
                for bridge_name in &port.spec.logical_bridges {
                    let Some(mut bridge) = db.load::<LogicalBridge>(bridge_name)? else {
                        continue;
                    };
                    if let Err(e) = bridge.delete_bridge_port(port.name(), &mac) {
                        warn!("Detaching '{}' from '{bridge_name}': {e}", port.name());
                        continue;
                    }
                    db.persist(&bridge)?;
                }
                Ok(())
            },
        )
    }

    /* ------------------------------------------------------------------ */
    /* SVI                                                                 */
    /* ------------------------------------------------------------------ */

    pub fn create_svi(&self, name: &str, spec: SviSpec) -> InfraResult<Svi> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::Svi)?;
        let _v = lock(&self.vrf_lock);
        let _b = lock(&self.bridge_lock);
        let _s = lock(&self.svi_lock);
        if let Some(existing) = self.load::<Svi>(name)? {
            debug!("Create of existing SVI '{name}' returns the stored object");
            return Ok(existing);
        }
        let mut vrf: Vrf = self
            .load(&spec.vrf)?
            .ok_or_else(|| InfraError::ReferenceNotFound(spec.vrf.clone()))?;
        let mut bridge: LogicalBridge = self
            .load(&spec.logical_bridge)?
            .ok_or_else(|| InfraError::ReferenceNotFound(spec.logical_bridge.clone()))?;
        bridge.add_svi(name)?;
        vrf.add_svi(name)?;

        let svi = Svi::new(name, spec, &subs);
        self.persist(&vrf)?;
        self.persist(&bridge)?;
        self.persist(&svi)?;
        self.add_name(ObjectType::Svi, name)?;
        self.tasks
            .create_task(ObjectType::Svi, name, &svi.resource_version, subs);
        info!("Created SVI '{name}'");
        Ok(svi)
    }

    pub fn get_svi(&self, name: &str) -> InfraResult<Svi> {
        let _s = lock(&self.svi_lock);
        self.load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))
    }

    pub fn update_svi(
        &self,
        name: &str,
        spec: SviSpec,
        expected_version: Option<&str>,
    ) -> InfraResult<Svi> {
        spec.validate()?;
        let subs = self.subscribers(ObjectType::Svi)?;
        let _s = lock(&self.svi_lock);
        let mut svi: Svi = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        if let Some(expected) = expected_version {
            if expected != svi.resource_version {
                return Err(InfraError::VersionMismatch(name.to_string()));
            }
        }
        if svi.spec.vrf != spec.vrf || svi.spec.logical_bridge != spec.logical_bridge {
            return Err(InfraError::InvalidArgument(
                "the references of an SVI cannot be changed; delete and re-create".to_string(),
            ));
        }
        if svi.spec == spec {
            debug!("Update of SVI '{name}' changes nothing");
            return Ok(svi);
        }
        svi.spec = spec;
        svi.touch();
        self.persist(&svi)?;
        self.tasks
            .create_task(ObjectType::Svi, name, &svi.resource_version, subs);
        info!("Updated SVI '{name}'");
        Ok(svi)
    }

    pub fn delete_svi(&self, name: &str) -> InfraResult<()> {
        let subs = self.subscribers(ObjectType::Svi)?;
        let _s = lock(&self.svi_lock);
        let mut svi: Svi = self
            .load(name)?
            .ok_or_else(|| InfraError::NotFound(name.to_string()))?;
        self.mark_for_deletion(&mut svi);
        self.persist(&svi)?;
        self.tasks
            .create_task(ObjectType::Svi, name, &svi.resource_version, subs);
        info!("SVI '{name}' marked for deletion");
        Ok(())
    }

    pub fn list_svis(&self) -> InfraResult<Vec<Svi>> {
        let _s = lock(&self.svi_lock);
        self.list_objects()
    }

    pub fn update_svi_status(
        &self,
        name: &str,
        version: &str,
        notification_id: &str,
        component: Component,
    ) -> InfraResult<()> {
        let _v = lock(&self.vrf_lock);
        let _b = lock(&self.bridge_lock);
        let _s = lock(&self.svi_lock);
        self.apply_status::<Svi>(
            name,
            version,
            notification_id,
            component,
            |_| {},
            |db, svi| {
                // unhook from the VRF and the bridge now that tear-down
                // converged
                if let Some(mut vrf) = db.load::<Vrf>(&svi.spec.vrf)? {
                    if let Err(e) = vrf.delete_svi(svi.name()) {
                        warn!("Unhooking '{}' from '{}': {e}", svi.name(), svi.spec.vrf);
                    } else {
                        db.persist(&vrf)?;
                    }
                }
                if let Some(mut bridge) = db.load::<LogicalBridge>(&svi.spec.logical_bridge)? {
                    if let Err(e) = bridge.delete_svi(svi.name()) {
                        warn!(
                            "Unhooking '{}' from '{}': {e}",
                            svi.name(),
                            svi.spec.logical_bridge
                        );
                    } else {
                        db.persist(&bridge)?;
                    }
                }
                Ok(())
            },
        )
    }

    /* ------------------------------------------------------------------ */
    /* shared mechanics                                                    */
    /* ------------------------------------------------------------------ */

    /// Two-phase delete, phase one: fresh version, whole pipeline back to
    /// pending, oper status to-be-deleted. The row disappears only when
    /// every component acknowledged the tear-down.
    fn mark_for_deletion<O: InfraObject>(&self, object: &mut O) {
        object.set_resource_version(generate_version());
        let status = object.status_mut();
        status.reset_pending();
        status.oper = OperStatus::ToBeDeleted;
    }

    /// Caller must hold the kind's lock.
    fn list_objects<O: InfraObject>(&self) -> InfraResult<Vec<O>> {
        let mut objects = Vec::new();
        for name in self.names(O::KIND)? {
            if let Some(object) = self.load(&name)? {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    /// Common path of every status-update entry point. Verifies the version
    /// (a moved version means a newer task owns the object: the report is
    /// rejected and the in-flight task told to drop), applies the overlay
    /// and the component, and on full success either brings the object up
    /// or — on the tear-down path — runs `finalize` and removes the row.
    /// Callers hold every lock `finalize` may need.
    fn apply_status<O: InfraObject>(
        &self,
        name: &str,
        version: &str,
        notification_id: &str,
        component: Component,
        overlay: impl FnOnce(&mut O),
        finalize: impl FnOnce(&Self, &O) -> InfraResult<()>,
    ) -> InfraResult<()> {
        let kind = O::KIND;
        let report = |drop_task: bool, component: Component| TaskStatus {
            kind,
            name: name.to_string(),
            notification_id: notification_id.to_string(),
            drop_task,
            component,
        };

        let Some(mut object) = self.load::<O>(name)? else {
            self.tasks.status_updated(report(true, component));
            return Err(InfraError::NotFound(name.to_string()));
        };
        if object.resource_version() != version {
            debug!(
                "Status report for {kind} '{name}' at superseded version {version}; dropping task"
            );
            self.tasks.status_updated(report(true, component));
            return Err(InfraError::VersionMismatch(name.to_string()));
        }

        overlay(&mut object);
        object.status_mut().set_component(component.clone());

        if object.all_success() {
            if object.status().oper == OperStatus::ToBeDeleted {
                finalize(self, &object)?;
                self.store.delete(name)?;
                self.remove_name(kind, name)?;
                info!("Removed {kind} '{name}'");
                self.tasks.status_updated(report(false, component));
                return Ok(());
            }
            object.status_mut().oper = OperStatus::Up;
            object.old_versions_mut().clear();
            info!("{kind} '{name}' converged");
        }

        self.persist(&object)?;
        self.tasks.status_updated(report(false, component));
        Ok(())
    }

    fn replay_objects<O: InfraObject>(&self, component: &str) -> InfraResult<usize> {
        let subs = self.bus.subscribers(O::KIND.event());
        let _g = lock(self.kind_lock(O::KIND));
        let mut enqueued = 0;
        for name in self.names(O::KIND)? {
            let Some(mut object) = self.load::<O>(&name)? else {
                continue;
            };
            let subset = object.prepare_for_replay(component, &subs);
            self.persist(&object)?;
            if !subset.is_empty() {
                self.tasks
                    .create_task(O::KIND, &name, object.resource_version(), subset);
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    fn replay_kind(&self, kind: ObjectType, component: &str) -> InfraResult<usize> {
        match kind {
            ObjectType::Vrf => self.replay_objects::<Vrf>(component),
            ObjectType::LogicalBridge => self.replay_objects::<LogicalBridge>(component),
            ObjectType::BridgePort => self.replay_objects::<BridgePort>(component),
            ObjectType::Svi => self.replay_objects::<Svi>(component),
        }
    }
}

#[async_trait]
impl ReplayDriver for InfraDb {
    fn live_version(&self, kind: ObjectType, name: &str) -> InfraResult<Option<String>> {
        let _g = lock(self.kind_lock(kind));
        let version = match kind {
            ObjectType::Vrf => self.load::<Vrf>(name)?.map(|o| o.resource_version),
            ObjectType::LogicalBridge => {
                self.load::<LogicalBridge>(name)?.map(|o| o.resource_version)
            }
            ObjectType::BridgePort => self.load::<BridgePort>(name)?.map(|o| o.resource_version),
            ObjectType::Svi => self.load::<Svi>(name)?.map(|o| o.resource_version),
        };
        Ok(version)
    }

    /// Rebuild back-end state from persisted intent: quiesce the back ends
    /// over the action bus, then walk the kinds in dependency order and
    /// re-enqueue every object whose pipeline is not fully converged.
    async fn replay(&self, component: &str) {
        info!("Starting global replay triggered by component '{component}'");
        for (module, outcome) in self.actions.publish(PRE_REPLAY).await {
            match outcome {
                Ok(()) => debug!("Module '{module}' acknowledged {PRE_REPLAY}"),
                Err(e) => error!("Module '{module}' failed {PRE_REPLAY}: {e}"),
            }
        }
        let mut enqueued = 0;
        for kind in ObjectType::REPLAY_ORDER {
            match self.replay_kind(kind, component) {
                Ok(count) => enqueued += count,
                Err(e) => error!("Replay walk over {kind} objects failed: {e}"),
            }
        }
        info!("Replay enqueued {enqueued} task(s)");
    }
}
