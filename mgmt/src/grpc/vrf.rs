// SPDX-License-Identifier: Apache-2.0

//! VRF management service

use super::{paginate, resolve_id, validate_resource_name, Pagination};
use crate::errors::ApiError;
use infradb::objects::{ObjectType, Vrf, VrfSpec};
use infradb::{InfraDb, InfraError};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct CreateVrfRequest {
    /// client-chosen resource id; system-generated when empty
    pub vrf_id: String,
    pub spec: VrfSpec,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateVrfRequest {
    pub name: String,
    pub spec: VrfSpec,
    /// spec fields to change; empty means full replacement
    pub update_mask: Vec<String>,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteVrfRequest {
    pub name: String,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListVrfsRequest {
    pub page_size: i32,
    pub page_token: String,
}

#[derive(Clone, Debug)]
pub struct ListVrfsResponse {
    pub vrfs: Vec<Vrf>,
    pub next_page_token: String,
}

fn apply_mask(stored: &VrfSpec, incoming: &VrfSpec, mask: &[String]) -> Result<VrfSpec, ApiError> {
    if mask.is_empty() {
        return Ok(incoming.clone());
    }
    let mut merged = stored.clone();
    for path in mask {
        match path.as_str() {
            "vni" => merged.vni = incoming.vni,
            "loopback_ip" => merged.loopback_ip = incoming.loopback_ip,
            "vtep_ip" => merged.vtep_ip = incoming.vtep_ip,
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "unknown field mask path '{other}'"
                )))
            }
        }
    }
    Ok(merged)
}

pub struct VrfService {
    db: Arc<InfraDb>,
    pagination: Arc<Pagination>,
}

impl VrfService {
    pub fn new(db: Arc<InfraDb>, pagination: Arc<Pagination>) -> Self {
        Self { db, pagination }
    }

    pub async fn create_vrf(&self, request: CreateVrfRequest) -> Result<Vrf, ApiError> {
        let name = resolve_id(ObjectType::Vrf, &request.vrf_id)?;
        debug!("CreateVrf '{name}'");
        Ok(self.db.create_vrf(&name, request.spec)?)
    }

    pub async fn get_vrf(&self, name: &str) -> Result<Vrf, ApiError> {
        validate_resource_name(ObjectType::Vrf, name)?;
        Ok(self.db.get_vrf(name)?)
    }

    pub async fn update_vrf(&self, request: UpdateVrfRequest) -> Result<Vrf, ApiError> {
        validate_resource_name(ObjectType::Vrf, &request.name)?;
        let stored = match self.db.get_vrf(&request.name) {
            Ok(stored) => stored,
            Err(InfraError::NotFound(_)) if request.allow_missing => {
                debug!("UpdateVrf '{}' creates the missing object", request.name);
                return Ok(self.db.create_vrf(&request.name, request.spec)?);
            }
            Err(e) => return Err(e.into()),
        };
        let merged = apply_mask(&stored.spec, &request.spec, &request.update_mask)?;
        Ok(self
            .db
            .update_vrf(&request.name, merged, Some(&stored.resource_version))?)
    }

    pub async fn delete_vrf(&self, request: DeleteVrfRequest) -> Result<(), ApiError> {
        validate_resource_name(ObjectType::Vrf, &request.name)?;
        match self.db.delete_vrf(&request.name) {
            Err(InfraError::NotFound(_)) if request.allow_missing => Ok(()),
            other => Ok(other?),
        }
    }

    pub async fn list_vrfs(&self, request: ListVrfsRequest) -> Result<ListVrfsResponse, ApiError> {
        let (size, offset) = self
            .pagination
            .extract(request.page_size, &request.page_token)?;
        let all = self.db.list_vrfs()?;
        let (vrfs, next_page_token) = paginate(&all, size, offset, &self.pagination);
        Ok(ListVrfsResponse {
            vrfs,
            next_page_token,
        })
    }
}
