// SPDX-License-Identifier: Apache-2.0

//! Logical bridge: a layer-2 broadcast domain, optionally VXLAN-extended

use super::common::{generate_version, Status};
use super::{InfraObject, ObjectType};
use crate::error::{InfraError, InfraResult};
use crate::eventbus::Subscriber;
use derive_builder::Builder;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const VNI_MAX: u32 = (1 << 24) - 1;
const VLAN_MAX: u32 = 4094;

#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[builder(default)]
pub struct LogicalBridgeSpec {
    pub vlan_id: u32,
    pub vni: Option<u32>,
    pub vtep_ip: Option<IpNet>,
}

impl LogicalBridgeSpec {
    pub fn validate(&self) -> InfraResult<()> {
        if self.vlan_id == 0 || self.vlan_id > VLAN_MAX {
            return Err(InfraError::InvalidArgument(format!(
                "VLAN id must be in [1, {VLAN_MAX}], got {}",
                self.vlan_id
            )));
        }
        if let Some(vni) = self.vni {
            if vni > VNI_MAX {
                return Err(InfraError::InvalidArgument(format!(
                    "'{vni}' is not a valid VNI"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalBridgeMetadata {}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalBridge {
    pub name: String,
    pub spec: LogicalBridgeSpec,
    pub status: Status,
    pub metadata: LogicalBridgeMetadata,
    /// reverse reference: the single SVI anchored on this bridge, if any
    pub svi: Option<String>,
    /// reverse references: names of the ports attached to this bridge
    pub bridge_ports: BTreeSet<String>,
    /// mac (textual form) -> owning port name; one entry per attached port
    pub mac_table: BTreeMap<String, String>,
    pub old_versions: Vec<String>,
    pub resource_version: String,
}

impl LogicalBridge {
    pub fn new(name: &str, spec: LogicalBridgeSpec, subs: &[Arc<Subscriber>]) -> Self {
        Self {
            name: name.to_string(),
            spec,
            status: Status::pending(subs.iter().map(|s| s.name.as_str())),
            metadata: LogicalBridgeMetadata::default(),
            svi: None,
            bridge_ports: BTreeSet::new(),
            mac_table: BTreeMap::new(),
            old_versions: Vec::new(),
            resource_version: generate_version(),
        }
    }

    pub fn has_dependents(&self) -> bool {
        self.svi.is_some() || !self.bridge_ports.is_empty()
    }

    /// Anchor an SVI on this bridge. A bridge accepts at most one.
    pub fn add_svi(&mut self, svi_name: &str) -> InfraResult<()> {
        if let Some(existing) = &self.svi {
            return Err(InfraError::ReferenceConflict(format!(
                "logical bridge '{}' already has SVI '{existing}'",
                self.name
            )));
        }
        self.svi = Some(svi_name.to_string());
        Ok(())
    }

    pub fn delete_svi(&mut self, svi_name: &str) -> InfraResult<()> {
        if self.svi.as_deref() != Some(svi_name) {
            return Err(InfraError::ReferenceConflict(format!(
                "logical bridge '{}' is not bound to SVI '{svi_name}'",
                self.name
            )));
        }
        self.svi = None;
        Ok(())
    }

    /// Attach a port. Both the port name and its MAC must be new to this
    /// bridge.
    pub fn add_bridge_port(&mut self, port_name: &str, mac: &str) -> InfraResult<()> {
        if self.bridge_ports.contains(port_name) {
            return Err(InfraError::ReferenceConflict(format!(
                "logical bridge '{}' already has port '{port_name}'",
                self.name
            )));
        }
        if self.mac_table.contains_key(mac) {
            return Err(InfraError::ReferenceConflict(format!(
                "mac '{mac}' is already present on logical bridge '{}'",
                self.name
            )));
        }
        self.bridge_ports.insert(port_name.to_string());
        self.mac_table.insert(mac.to_string(), port_name.to_string());
        Ok(())
    }

    pub fn delete_bridge_port(&mut self, port_name: &str, mac: &str) -> InfraResult<()> {
        if !self.bridge_ports.remove(port_name) {
            return Err(InfraError::ReferenceConflict(format!(
                "logical bridge '{}' has no port '{port_name}'",
                self.name
            )));
        }
        self.mac_table.remove(mac);
        Ok(())
    }
}

impl InfraObject for LogicalBridge {
    const KIND: ObjectType = ObjectType::LogicalBridge;

    fn name(&self) -> &str {
        &self.name
    }
    fn status(&self) -> &Status {
        &self.status
    }
    fn status_mut(&mut self) -> &mut Status {
        &mut self.status
    }
    fn resource_version(&self) -> &str {
        &self.resource_version
    }
    fn set_resource_version(&mut self, version: String) {
        self.resource_version = version;
    }
    fn old_versions_mut(&mut self) -> &mut Vec<String> {
        &mut self.old_versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge() -> LogicalBridge {
        let spec = LogicalBridgeSpecBuilder::default()
            .vlan_id(22u32)
            .vni(Some(11))
            .build()
            .unwrap();
        LogicalBridge::new("//network.opiproject.org/bridges/lb9", spec, &[])
    }

    #[test]
    fn test_vlan_range() {
        assert!(LogicalBridgeSpec::default().validate().is_err());
        let spec = LogicalBridgeSpecBuilder::default()
            .vlan_id(4095u32)
            .build()
            .unwrap();
        assert!(spec.validate().is_err());
        let spec = LogicalBridgeSpecBuilder::default()
            .vlan_id(4094u32)
            .build()
            .unwrap();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_single_svi() {
        let mut lb = bridge();
        lb.add_svi("svi-1").unwrap();
        assert!(matches!(
            lb.add_svi("svi-2"),
            Err(InfraError::ReferenceConflict(_))
        ));
        assert!(lb.delete_svi("svi-2").is_err());
        lb.delete_svi("svi-1").unwrap();
        assert!(lb.svi.is_none());
    }

    #[test]
    fn test_port_and_mac_uniqueness() {
        let mut lb = bridge();
        lb.add_bridge_port("port-1", "aa:bb:cc:dd:ee:01").unwrap();
        // duplicate port name
        assert!(lb.add_bridge_port("port-1", "aa:bb:cc:dd:ee:02").is_err());
        // duplicate mac under a different port name
        assert!(lb.add_bridge_port("port-2", "aa:bb:cc:dd:ee:01").is_err());
        lb.add_bridge_port("port-2", "aa:bb:cc:dd:ee:02").unwrap();
        assert!(lb.has_dependents());

        lb.delete_bridge_port("port-1", "aa:bb:cc:dd:ee:01").unwrap();
        lb.delete_bridge_port("port-2", "aa:bb:cc:dd:ee:02").unwrap();
        assert!(!lb.has_dependents());
        assert!(lb.mac_table.is_empty());
    }
}
