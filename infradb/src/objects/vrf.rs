// SPDX-License-Identifier: Apache-2.0

//! VRF: a layer-3 routing domain, optionally VXLAN-extended

use super::common::{generate_version, Status};
use super::{InfraObject, ObjectType};
use crate::error::{InfraError, InfraResult};
use crate::eventbus::Subscriber;
use derive_builder::Builder;
use ipnet::IpNet;
use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The default VRF. Created at startup, never deletable.
pub const GRD_VRF: &str = "//network.opiproject.org/vrfs/GRD";

const VNI_MAX: u32 = (1 << 24) - 1;

#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[builder(default)]
pub struct VrfSpec {
    pub vni: Option<u32>,
    pub loopback_ip: Option<IpNet>,
    pub vtep_ip: Option<IpNet>,
}

impl VrfSpec {
    pub fn validate(&self) -> InfraResult<()> {
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

/// Facts derived by the back ends while programming the VRF, delivered
/// through the status-update overlay and persisted with the object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VrfMetadata {
    /// kernel routing table ids allocated for this VRF
    pub routing_table: Vec<u32>,
    /// EVPN route distinguisher reported by the routing daemon
    pub rd: Option<String>,
    /// router MAC advertised for symmetric IRB
    pub rmac: Option<MacAddr6>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vrf {
    pub name: String,
    pub spec: VrfSpec,
    pub status: Status,
    pub metadata: VrfMetadata,
    /// reverse references: names of the SVIs bound to this VRF
    pub svis: BTreeSet<String>,
    pub old_versions: Vec<String>,
    pub resource_version: String,
}

impl Vrf {
    pub fn new(name: &str, spec: VrfSpec, subs: &[Arc<Subscriber>]) -> Self {
        Self {
            name: name.to_string(),
            spec,
            status: Status::pending(subs.iter().map(|s| s.name.as_str())),
            metadata: VrfMetadata::default(),
            svis: BTreeSet::new(),
            old_versions: Vec::new(),
            resource_version: generate_version(),
        }
    }

    pub fn is_grd(&self) -> bool {
        self.name == GRD_VRF
    }

    pub fn has_dependents(&self) -> bool {
        !self.svis.is_empty()
    }

    /// Record that an SVI is anchored in this VRF.
    pub fn add_svi(&mut self, svi_name: &str) -> InfraResult<()> {
        if !self.svis.insert(svi_name.to_string()) {
            return Err(InfraError::ReferenceConflict(format!(
                "VRF '{}' already references SVI '{svi_name}'",
                self.name
            )));
        }
        Ok(())
    }

    pub fn delete_svi(&mut self, svi_name: &str) -> InfraResult<()> {
        if !self.svis.remove(svi_name) {
            return Err(InfraError::ReferenceConflict(format!(
                "VRF '{}' does not reference SVI '{svi_name}'",
                self.name
            )));
        }
        Ok(())
    }
}

impl InfraObject for Vrf {
    const KIND: ObjectType = ObjectType::Vrf;

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
    use crate::objects::common::OperStatus;

    #[test]
    fn test_vni_range() {
        let spec = VrfSpecBuilder::default()
            .vni(Some(1 << 24))
            .build()
            .unwrap();
        assert!(matches!(
            spec.validate(),
            Err(InfraError::InvalidArgument(_))
        ));
        let spec = VrfSpecBuilder::default().vni(Some(100)).build().unwrap();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_svi_references() {
        let mut vrf = Vrf::new("//network.opiproject.org/vrfs/blue", VrfSpec::default(), &[]);
        assert!(!vrf.has_dependents());

        vrf.add_svi("svi-1").unwrap();
        assert!(vrf.add_svi("svi-1").is_err());
        assert!(vrf.has_dependents());

        vrf.delete_svi("svi-1").unwrap();
        assert!(vrf.delete_svi("svi-1").is_err());
        assert!(!vrf.has_dependents());
    }

    #[test]
    fn test_touch_resets_pipeline() {
        let mut vrf = Vrf::new(GRD_VRF, VrfSpec::default(), &[]);
        vrf.status.oper = OperStatus::Up;
        let first = vrf.resource_version.clone();
        vrf.touch();
        assert_ne!(vrf.resource_version, first);
        assert_eq!(vrf.old_versions, vec![first]);
        assert_eq!(vrf.status.oper, OperStatus::Down);
    }
}
