// SPDX-License-Identifier: Apache-2.0

//! Logical-bridge management service

use super::{paginate, resolve_id, validate_resource_name, Pagination};
use crate::errors::ApiError;
use infradb::objects::{LogicalBridge, LogicalBridgeSpec, ObjectType};
use infradb::{InfraDb, InfraError};
use ipnet::IpNet;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct CreateLogicalBridgeRequest {
    pub logical_bridge_id: String,
    pub spec: LogicalBridgeSpec,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateLogicalBridgeRequest {
    pub name: String,
    pub spec: LogicalBridgeSpec,
    pub update_mask: Vec<String>,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeleteLogicalBridgeRequest {
    pub name: String,
    pub allow_missing: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListLogicalBridgesRequest {
    pub page_size: i32,
    pub page_token: String,
}

#[derive(Clone, Debug)]
pub struct ListLogicalBridgesResponse {
    pub logical_bridges: Vec<LogicalBridge>,
    pub next_page_token: String,
}

fn apply_mask(
    stored: &LogicalBridgeSpec,
    incoming: &LogicalBridgeSpec,
    mask: &[String],
) -> Result<LogicalBridgeSpec, ApiError> {
    if mask.is_empty() {
        return Ok(incoming.clone());
    }
    let mut merged = stored.clone();
    for path in mask {
        match path.as_str() {
            "vlan_id" => merged.vlan_id = incoming.vlan_id,
            "vni" => merged.vni = incoming.vni,
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

pub struct LogicalBridgeService {
    db: Arc<InfraDb>,
    pagination: Arc<Pagination>,
    /// VTEP injected into specs that do not carry one (from configuration)
    default_vtep: Option<IpNet>,
}

impl LogicalBridgeService {
    pub fn new(db: Arc<InfraDb>, pagination: Arc<Pagination>, default_vtep: Option<IpNet>) -> Self {
        Self {
            db,
            pagination,
            default_vtep,
        }
    }

    fn with_default_vtep(&self, mut spec: LogicalBridgeSpec) -> LogicalBridgeSpec {
        if spec.vtep_ip.is_none() {
            spec.vtep_ip = self.default_vtep;
        }
        spec
    }

    pub async fn create_logical_bridge(
        &self,
        request: CreateLogicalBridgeRequest,
    ) -> Result<LogicalBridge, ApiError> {
        let name = resolve_id(ObjectType::LogicalBridge, &request.logical_bridge_id)?;
        debug!("CreateLogicalBridge '{name}'");
        let spec = self.with_default_vtep(request.spec);
        Ok(self.db.create_logical_bridge(&name, spec)?)
    }

    pub async fn get_logical_bridge(&self, name: &str) -> Result<LogicalBridge, ApiError> {
        validate_resource_name(ObjectType::LogicalBridge, name)?;
        Ok(self.db.get_logical_bridge(name)?)
    }

    pub async fn update_logical_bridge(
        &self,
        request: UpdateLogicalBridgeRequest,
    ) -> Result<LogicalBridge, ApiError> {
        validate_resource_name(ObjectType::LogicalBridge, &request.name)?;
        let stored = match self.db.get_logical_bridge(&request.name) {
            Ok(stored) => stored,
            Err(InfraError::NotFound(_)) if request.allow_missing => {
                debug!(
                    "UpdateLogicalBridge '{}' creates the missing object",
                    request.name
                );
                let spec = self.with_default_vtep(request.spec);
                return Ok(self.db.create_logical_bridge(&request.name, spec)?);
            }
            Err(e) => return Err(e.into()),
        };
        let merged = apply_mask(&stored.spec, &request.spec, &request.update_mask)?;
        Ok(self.db.update_logical_bridge(
            &request.name,
            merged,
            Some(&stored.resource_version),
        )?)
    }

    pub async fn delete_logical_bridge(
        &self,
        request: DeleteLogicalBridgeRequest,
    ) -> Result<(), ApiError> {
        validate_resource_name(ObjectType::LogicalBridge, &request.name)?;
        match self.db.delete_logical_bridge(&request.name) {
            Err(InfraError::NotFound(_)) if request.allow_missing => Ok(()),
            other => Ok(other?),
        }
    }

    pub async fn list_logical_bridges(
        &self,
        request: ListLogicalBridgesRequest,
    ) -> Result<ListLogicalBridgesResponse, ApiError> {
        let (size, offset) = self
            .pagination
            .extract(request.page_size, &request.page_token)?;
        let all = self.db.list_logical_bridges()?;
        let (logical_bridges, next_page_token) = paginate(&all, size, offset, &self.pagination);
        Ok(ListLogicalBridgesResponse {
            logical_bridges,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_db;
    use infradb::objects::bridge::LogicalBridgeSpecBuilder;

    fn service() -> LogicalBridgeService {
        LogicalBridgeService::new(
            test_db(),
            Arc::new(Pagination::new()),
            Some("10.0.0.4/24".parse().unwrap()),
        )
    }

    fn spec(vlan: u32) -> LogicalBridgeSpec {
        LogicalBridgeSpecBuilder::default()
            .vlan_id(vlan)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_injects_default_vtep() {
        let svc = service();
        let bridge = svc
            .create_logical_bridge(CreateLogicalBridgeRequest {
                logical_bridge_id: "lb9".to_string(),
                spec: spec(22),
            })
            .await
            .unwrap();
        assert_eq!(bridge.spec.vtep_ip, Some("10.0.0.4/24".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_vtep() {
        let svc = service();
        let mut with_vtep = spec(22);
        with_vtep.vtep_ip = Some("192.168.1.1/32".parse().unwrap());
        let bridge = svc
            .create_logical_bridge(CreateLogicalBridgeRequest {
                logical_bridge_id: "lb9".to_string(),
                spec: with_vtep,
            })
            .await
            .unwrap();
        assert_eq!(bridge.spec.vtep_ip, Some("192.168.1.1/32".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_invalid_vlan_rejected() {
        let svc = service();
        let result = svc
            .create_logical_bridge(CreateLogicalBridgeRequest {
                logical_bridge_id: "lb9".to_string(),
                spec: spec(5000),
            })
            .await;
        assert!(matches!(result, Err(ApiError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_update_mask_changes_vni_only() {
        let svc = service();
        let bridge = svc
            .create_logical_bridge(CreateLogicalBridgeRequest {
                logical_bridge_id: "lb9".to_string(),
                spec: spec(22),
            })
            .await
            .unwrap();
        let mut incoming = spec(999);
        incoming.vni = Some(11);
        let updated = svc
            .update_logical_bridge(UpdateLogicalBridgeRequest {
                name: bridge.name.clone(),
                spec: incoming,
                update_mask: vec!["vni".to_string()],
                allow_missing: false,
            })
            .await
            .unwrap();
        assert_eq!(updated.spec.vlan_id, 22);
        assert_eq!(updated.spec.vni, Some(11));
    }
}
