// SPDX-License-Identifier: Apache-2.0

//! Domain objects of the EVPN gateway: VRFs, logical bridges, bridge ports
//! and SVIs, together with the envelope pieces they all share.

pub mod bridge;
pub mod common;
pub mod port;
pub mod svi;
pub mod vrf;

pub use bridge::{LogicalBridge, LogicalBridgeSpec};
pub use common::{CompStatus, Component, OperStatus, Status};
pub use port::{BridgePort, BridgePortSpec, BridgePortType};
pub use svi::{Svi, SviSpec};
pub use vrf::{Vrf, VrfSpec, GRD_VRF};

use crate::eventbus::Subscriber;
use common::generate_version;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Root of every resource name and store key.
pub const NAME_ROOT: &str = "//network.opiproject.org";

/// The object kinds InfraDB manages. The declaration order is the reference
/// (dependency) order used for lock acquisition and replay walks:
/// Vrf < LogicalBridge < BridgePort < Svi.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Vrf,
    LogicalBridge,
    BridgePort,
    Svi,
}

impl ObjectType {
    /// Kinds in dependency order, the order a replay walks them.
    pub const REPLAY_ORDER: [ObjectType; 4] = [
        ObjectType::Vrf,
        ObjectType::LogicalBridge,
        ObjectType::BridgePort,
        ObjectType::Svi,
    ];

    /// Event-bus topic of the kind.
    pub fn event(&self) -> &'static str {
        match self {
            ObjectType::Vrf => "vrf",
            ObjectType::LogicalBridge => "logical-bridge",
            ObjectType::BridgePort => "bridge-port",
            ObjectType::Svi => "svi",
        }
    }

    /// Plural path segment used in resource names and store keys.
    pub fn plural(&self) -> &'static str {
        match self {
            ObjectType::Vrf => "vrfs",
            ObjectType::LogicalBridge => "bridges",
            ObjectType::BridgePort => "ports",
            ObjectType::Svi => "svis",
        }
    }

    /// Full resource name (and store key) for an id of this kind.
    pub fn resource_name(&self, id: &str) -> String {
        format!("{NAME_ROOT}/{}/{id}", self.plural())
    }

    /// Store key holding the list of extant names of this kind, so that
    /// `List` needs no range scan.
    pub fn sentinel_key(&self) -> String {
        format!("{NAME_ROOT}/{}", self.plural())
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event())
    }
}

/// Envelope shared by every persisted object: a unique name, a spec, a
/// status vector, and an opaque resource version regenerated on mutation.
pub trait InfraObject: Clone + Serialize + DeserializeOwned + Send + 'static {
    const KIND: ObjectType;

    fn name(&self) -> &str;
    fn status(&self) -> &Status;
    fn status_mut(&mut self) -> &mut Status;
    fn resource_version(&self) -> &str;
    fn set_resource_version(&mut self, version: String);
    fn old_versions_mut(&mut self) -> &mut Vec<String>;

    /// True when every component of the pipeline reported success.
    fn all_success(&self) -> bool {
        self.status().all_success()
    }

    /// Record a spec mutation: remember the superseded version, issue a
    /// fresh one and send the whole pipeline back to pending.
    fn touch(&mut self) {
        let old = self.resource_version().to_string();
        self.old_versions_mut().push(old);
        self.set_resource_version(generate_version());
        let status = self.status_mut();
        status.reset_pending();
        if status.oper == OperStatus::Up {
            status.oper = OperStatus::Down;
        }
    }

    /// Reset for a global replay: every component that matches the failing
    /// one or did not reach success goes back to pending, `Up` drops to
    /// `Down`, and the version is bumped so stale tasks die. Returns the
    /// subscribers that must be re-notified, in pipeline order.
    ///
    /// `subs` is the current subscriber list of this kind in priority
    /// order; the component vector is rebuilt against it.
    fn prepare_for_replay(
        &mut self,
        component: &str,
        subs: &[Arc<Subscriber>],
    ) -> Vec<Arc<Subscriber>> {
        let names: Vec<&str> = subs.iter().map(|s| s.name.as_str()).collect();
        let picked = self.status_mut().reset_for_replay(component, &names);
        self.set_resource_version(generate_version());
        picked.into_iter().filter_map(|i| subs.get(i).cloned()).collect()
    }
}
