// SPDX-License-Identifier: Apache-2.0

//! Bridge port: an interface attachment to one or more logical bridges

use super::common::{generate_version, Status};
use super::{InfraObject, ObjectType};
use crate::error::{InfraError, InfraResult};
use crate::eventbus::Subscriber;
use derive_builder::Builder;
use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgePortType {
    #[default]
    Unspecified,
    Access,
    Trunk,
}

#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgePortSpec {
    #[builder(default)]
    pub ptype: BridgePortType,
    pub mac_address: MacAddr6,
    #[builder(default)]
    pub logical_bridges: Vec<String>,
}

impl BridgePortSpec {
    pub fn validate(&self) -> InfraResult<()> {
        let mut seen = std::collections::BTreeSet::new();
        for bridge in &self.logical_bridges {
            if !seen.insert(bridge) {
                return Err(InfraError::InvalidArgument(format!(
                    "logical bridge '{bridge}' is referenced twice"
                )));
            }
        }
        match self.ptype {
            BridgePortType::Unspecified => Err(InfraError::InvalidArgument(
                "bridge port type must be access or trunk".to_string(),
            )),
            BridgePortType::Access if self.logical_bridges.len() != 1 => {
                Err(InfraError::InvalidArgument(format!(
                    "an access port references exactly one logical bridge, got {}",
                    self.logical_bridges.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Vendor-assigned facts delivered through the status-update overlay.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgePortMetadata {
    /// data-plane port handle allocated by the vendor module
    pub vport: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgePort {
    pub name: String,
    pub spec: BridgePortSpec,
    pub status: Status,
    pub metadata: BridgePortMetadata,
    /// a trunk with no bridge list carries all VLANs transparently
    pub transparent_trunk: bool,
    pub old_versions: Vec<String>,
    pub resource_version: String,
}

impl BridgePort {
    pub fn new(name: &str, spec: BridgePortSpec, subs: &[Arc<Subscriber>]) -> Self {
        let transparent_trunk = spec.logical_bridges.is_empty();
        Self {
            name: name.to_string(),
            spec,
            status: Status::pending(subs.iter().map(|s| s.name.as_str())),
            metadata: BridgePortMetadata::default(),
            transparent_trunk,
            old_versions: Vec::new(),
            resource_version: generate_version(),
        }
    }

    /// MAC in the textual form used as logical-bridge mac-table key.
    pub fn mac_string(&self) -> String {
        self.spec.mac_address.to_string()
    }
}

impl InfraObject for BridgePort {
    const KIND: ObjectType = ObjectType::BridgePort;

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
