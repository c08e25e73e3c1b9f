// SPDX-License-Identifier: Apache-2.0

//! SVI: the layer-3 anchor placing a logical bridge into a VRF

use super::common::{generate_version, Status};
use super::{InfraObject, ObjectType};
use crate::error::{InfraError, InfraResult};
use crate::eventbus::Subscriber;
use derive_builder::Builder;
use ipnet::IpNet;
use macaddr::MacAddr6;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SviSpec {
    /// name of the VRF this SVI is anchored in
    pub vrf: String,
    /// name of the logical bridge this SVI terminates
    pub logical_bridge: String,
    pub mac_address: MacAddr6,
    #[builder(default)]
    pub gateway_ips: Vec<IpNet>,
    #[builder(default)]
    pub enable_bgp: bool,
    #[builder(default)]
    pub remote_as: Option<u32>,
}

impl SviSpec {
    pub fn validate(&self) -> InfraResult<()> {
        if self.vrf.is_empty() {
            return Err(InfraError::InvalidArgument(
                "an SVI requires a VRF reference".to_string(),
            ));
        }
        if self.logical_bridge.is_empty() {
            return Err(InfraError::InvalidArgument(
                "an SVI requires a logical bridge reference".to_string(),
            ));
        }
        if self.enable_bgp {
            match self.remote_as {
                Some(remote_as) if (1..=65535).contains(&remote_as) => {}
                _ => {
                    return Err(InfraError::InvalidArgument(
                        "remote AS must be in [1, 65535] when BGP is enabled".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SviMetadata {}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Svi {
    pub name: String,
    pub spec: SviSpec,
    pub status: Status,
    pub metadata: SviMetadata,
    pub old_versions: Vec<String>,
    pub resource_version: String,
}

impl Svi {
    pub fn new(name: &str, spec: SviSpec, subs: &[Arc<Subscriber>]) -> Self {
        Self {
            name: name.to_string(),
            spec,
            status: Status::pending(subs.iter().map(|s| s.name.as_str())),
            metadata: SviMetadata::default(),
            old_versions: Vec::new(),
            resource_version: generate_version(),
        }
    }
}

impl InfraObject for Svi {
    const KIND: ObjectType = ObjectType::Svi;

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
