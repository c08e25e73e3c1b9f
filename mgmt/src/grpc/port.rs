// SPDX-License-Identifier: Apache-2.0

//! Bridge-port management service

use super::{paginate, resolve_id, validate_resource_name, Pagination};
use crate::errors::ApiError;
use infradb::objects::{BridgePort, BridgePortSpec, ObjectType};
use infradb::{InfraDb, InfraError};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct CreateBridgePortRequest {
    pub bridge_port_id: String,
    pub spec: BridgePortSpec,
}

#[derive(Clone, Debug)]
pub struct UpdateBridgePortRequest {
    pub name: String,
    pub spec: BridgePortSpec,
    pub update_mask: Vec<String>,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteBridgePortRequest {
    pub name: String,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListBridgePortsRequest {
    pub page_size: i32,
    pub page_token: String,
}

#[derive(Clone, Debug)]
pub struct ListBridgePortsResponse {
    pub bridge_ports: Vec<BridgePort>,
    pub next_page_token: String,
}

fn apply_mask(
    stored: &BridgePortSpec,
    incoming: &BridgePortSpec,
    mask: &[String],
) -> Result<BridgePortSpec, ApiError> {
    if mask.is_empty() {
        return Ok(incoming.clone());
    }
    let mut merged = stored.clone();
    for path in mask {
        match path.as_str() {
            "ptype" => merged.ptype = incoming.ptype,
            // the MAC and the bridge list are keyed into the attached
            // bridges; the facade rejects changing them on update
            "mac_address" => merged.mac_address = incoming.mac_address,
            "logical_bridges" => merged.logical_bridges = incoming.logical_bridges.clone(),
            other => {
                return Err(ApiError::InvalidArgument(format!(
                    "unknown field mask path '{other}'"
                )))
            }
        }
    }
    Ok(merged)
}

pub struct BridgePortService {
    db: Arc<InfraDb>,
    pagination: Arc<Pagination>,
}

impl BridgePortService {
    pub fn new(db: Arc<InfraDb>, pagination: Arc<Pagination>) -> Self {
        Self { db, pagination }
    }

    pub async fn create_bridge_port(
        &self,
        request: CreateBridgePortRequest,
    ) -> Result<BridgePort, ApiError> {
        let name = resolve_id(ObjectType::BridgePort, &request.bridge_port_id)?;
        debug!("CreateBridgePort '{name}'");
        Ok(self.db.create_bridge_port(&name, request.spec)?)
    }

    pub async fn get_bridge_port(&self, name: &str) -> Result<BridgePort, ApiError> {
        validate_resource_name(ObjectType::BridgePort, name)?;
        Ok(self.db.get_bridge_port(name)?)
    }

    pub async fn update_bridge_port(
        &self,
        request: UpdateBridgePortRequest,
    ) -> Result<BridgePort, ApiError> {
        validate_resource_name(ObjectType::BridgePort, &request.name)?;
        let stored = match self.db.get_bridge_port(&request.name) {
            Ok(stored) => stored,
            Err(InfraError::NotFound(_)) if request.allow_missing => {
                debug!(
                    "UpdateBridgePort '{}' creates the missing object",
                    request.name
                );
                return Ok(self.db.create_bridge_port(&request.name, request.spec)?);
            }
            Err(e) => return Err(e.into()),
        };
        let merged = apply_mask(&stored.spec, &request.spec, &request.update_mask)?;
        Ok(self
            .db
            .update_bridge_port(&request.name, merged, Some(&stored.resource_version))?)
    }

    pub async fn delete_bridge_port(
        &self,
        request: DeleteBridgePortRequest,
    ) -> Result<(), ApiError> {
        validate_resource_name(ObjectType::BridgePort, &request.name)?;
        match self.db.delete_bridge_port(&request.name) {
            Err(InfraError::NotFound(_)) if request.allow_missing => Ok(()),
            other => Ok(other?),
        }
    }

    pub async fn list_bridge_ports(
        &self,
        request: ListBridgePortsRequest,
    ) -> Result<ListBridgePortsResponse, ApiError> {
        let (size, offset) = self
            .pagination
            .extract(request.page_size, &request.page_token)?;
        let all = self.db.list_bridge_ports()?;
        let (bridge_ports, next_page_token) = paginate(&all, size, offset, &self.pagination);
        Ok(ListBridgePortsResponse {
            bridge_ports,
            next_page_token,
        })
    }
}
