// SPDX-License-Identifier: Apache-2.0

//! SVI management service

use super::{paginate, resolve_id, validate_resource_name, Pagination};
use crate::errors::ApiError;
use infradb::objects::{ObjectType, Svi, SviSpec};
use infradb::{InfraDb, InfraError};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct CreateSviRequest {
    pub svi_id: String,
    pub spec: SviSpec,
}

#[derive(Clone, Debug)]
pub struct UpdateSviRequest {
    pub name: String,
    pub spec: SviSpec,
    pub update_mask: Vec<String>,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteSviRequest {
    pub name: String,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListSvisRequest {
    pub page_size: i32,
    pub page_token: String,
}

#[derive(Clone, Debug)]
pub struct ListSvisResponse {
    pub svis: Vec<Svi>,
    pub next_page_token: String,
}

fn apply_mask(stored: &SviSpec, incoming: &SviSpec, mask: &[String]) -> Result<SviSpec, ApiError> {
    if mask.is_empty() {
        return Ok(incoming.clone());
    }
    let mut merged = stored.clone();
    for path in mask {
        match path.as_str() {
            "mac_address" => merged.mac_address = incoming.mac_address,
            "gateway_ips" => merged.gateway_ips = incoming.gateway_ips.clone(),
            "enable_bgp" => merged.enable_bgp = incoming.enable_bgp,
            "remote_as" => merged.remote_as = incoming.remote_as,
            "vrf" | "logical_bridge" => {
                return Err(ApiError::InvalidArgument(format!(
                    "field '{path}' of an SVI is immutable"
                )))
            }
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "unknown field mask path '{other}'"
                )))
            }
        }
    }
    Ok(merged)
}

pub struct SviService {
    db: Arc<InfraDb>,
    pagination: Arc<Pagination>,
}

impl SviService {
    pub fn new(db: Arc<InfraDb>, pagination: Arc<Pagination>) -> Self {
        Self { db, pagination }
    }

    pub async fn create_svi(&self, request: CreateSviRequest) -> Result<Svi, ApiError> {
        let name = resolve_id(ObjectType::Svi, &request.svi_id)?;
        validate_resource_name(ObjectType::Vrf, &request.spec.vrf)?;
        validate_resource_name(ObjectType::LogicalBridge, &request.spec.logical_bridge)?;
        debug!("CreateSvi '{name}'");
        Ok(self.db.create_svi(&name, request.spec)?)
    }

    pub async fn get_svi(&self, name: &str) -> Result<Svi, ApiError> {
        validate_resource_name(ObjectType::Svi, name)?;
        Ok(self.db.get_svi(name)?)
    }

    pub async fn update_svi(&self, request: UpdateSviRequest) -> Result<Svi, ApiError> {
        validate_resource_name(ObjectType::Svi, &request.name)?;
        let stored = match self.db.get_svi(&request.name) {
            Ok(stored) => stored,
            Err(InfraError::NotFound(_)) if request.allow_missing => {
                debug!("UpdateSvi '{}' creates the missing object", request.name);
                validate_resource_name(ObjectType::Vrf, &request.spec.vrf)?;
                validate_resource_name(ObjectType::LogicalBridge, &request.spec.logical_bridge)?;
                return Ok(self.db.create_svi(&request.name, request.spec)?);
            }
            Err(e) => return Err(e.into()),
        };
        let merged = apply_mask(&stored.spec, &request.spec, &request.update_mask)?;
        Ok(self
            .db
            .update_svi(&request.name, merged, Some(&stored.resource_version))?)
    }

    pub async fn delete_svi(&self, request: DeleteSviRequest) -> Result<(), ApiError> {
        validate_resource_name(ObjectType::Svi, &request.name)?;
        match self.db.delete_svi(&request.name) {
            Err(InfraError::NotFound(_)) if request.allow_missing => Ok(()),
            other => Ok(other?),
        }
    }

    pub async fn list_svis(&self, request: ListSvisRequest) -> Result<ListSvisResponse, ApiError> {
        let (size, offset) = self
            .pagination
            .extract(request.page_size, &request.page_token)?;
        let all = self.db.list_svis()?;
        let (svis, next_page_token) = paginate(&all, size, offset, &self.pagination);
        Ok(ListSvisResponse {
            svis,
            next_page_token,
        })
    }
}
