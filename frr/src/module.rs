// SPDX-License-Identifier: Apache-2.0

//! The FRR subscriber and its preReplay action handler

use crate::renderer::{
    render_svi, render_svi_teardown, render_vrf, render_vrf_teardown, short_name,
};
use crate::FrrErr;
use async_trait::async_trait;
use infradb::actionbus::{ActionBus, ActionData, ActionHandler, PRE_REPLAY};
use infradb::eventbus::{EventBus, EventHandler, ObjectData};
use infradb::objects::vrf::VrfMetadata;
use infradb::objects::{CompStatus, Component, OperStatus, Svi, Vrf};
use infradb::InfraDb;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Component name this module reports under.
pub const FRR_COMPONENT: &str = "frr";

/// Build the error component for a failed step: keep the escalation clock
/// from the component's last persisted state and double it.
fn errored(prior: Option<&Component>, details: String) -> Component {
    let mut component = prior
        .cloned()
        .unwrap_or_else(|| Component::pending(FRR_COMPONENT));
    component.status = CompStatus::Error;
    component.details = details;
    component.bump_timer();
    component
}

/// EVPN VNI facts as reported by `show bgp l2vpn evpn vni <vni> json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BgpL2vpnVni {
    vni: u32,
    rd: String,
    rmac: String,
    in_kernel: String,
}

pub struct FrrModule {
    db: Arc<InfraDb>,
    local_as: u32,
    reload_script: PathBuf,
    staging_dir: PathBuf,
}

impl FrrModule {
    pub fn new(db: Arc<InfraDb>, local_as: u32) -> Arc<Self> {
        Arc::new(Self {
            db,
            local_as,
            reload_script: PathBuf::from("/usr/lib/frr/frr-reload.py"),
            staging_dir: PathBuf::from("/tmp"),
        })
    }

    /// Wire the module into the buses: VRF and SVI events plus the
    /// preReplay action.
    pub fn register(
        db: Arc<InfraDb>,
        bus: &EventBus,
        actions: &ActionBus,
        local_as: u32,
        priority: u32,
        channel_size: usize,
    ) {
        let module = Self::new(db, local_as);
        for event in ["vrf", "svi"] {
            bus.start_subscriber(FRR_COMPONENT, event, priority, channel_size, module.clone());
        }
        actions.subscribe(FRR_COMPONENT, PRE_REPLAY, Arc::new(FrrActionHandler::new()));
        info!("FRR module registered (local AS {local_as})");
    }

    /// Stage a rendered config and drive it into the daemon with
    /// frr-reload.
    async fn apply(&self, config: &str, tag: &str) -> Result<(), FrrErr> {
        if config.is_empty() {
            return Ok(());
        }
        let staged = self.staging_dir.join(format!("frr-{tag}.conf"));
        tokio::fs::write(&staged, config)
            .await
            .map_err(|e| FrrErr::Io(e.to_string()))?;
        let output = Command::new("python3")
            .arg(&self.reload_script)
            .arg("--reload")
            .arg(&staged)
            .output()
            .await
            .map_err(|e| FrrErr::CommandFailed("frr-reload.py".to_string(), e.to_string()))?;
        if !output.status.success() {
            return Err(FrrErr::ReloadErr(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    /// Ask the daemon for the facts it derived for a VNI (RD, router MAC).
    async fn query_vrf_facts(&self, vni: u32) -> Result<Option<VrfMetadata>, FrrErr> {
        let output = Command::new("vtysh")
            .arg("-c")
            .arg(format!("show bgp l2vpn evpn vni {vni} json"))
            .output()
            .await
            .map_err(|e| FrrErr::CommandFailed("vtysh".to_string(), e.to_string()))?;
        if !output.status.success() {
            return Err(FrrErr::CommandFailed(
                "vtysh".to_string(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        let facts: BgpL2vpnVni = serde_json::from_slice(&output.stdout)
            .map_err(|e| FrrErr::DecodeError(e.to_string()))?;
        if facts.vni != vni {
            return Ok(None);
        }
        Ok(Some(VrfMetadata {
            routing_table: vec![],
            rd: (!facts.rd.is_empty()).then_some(facts.rd),
            rmac: facts.rmac.parse().ok(),
        }))
    }

    async fn set_up_vrf(&self, vrf: &Vrf) -> Result<Option<VrfMetadata>, FrrErr> {
        let Some(vni) = vrf.spec.vni else {
            debug!("VRF '{}' has no VNI, nothing for FRR to do", vrf.name);
            return Ok(None);
        };
        let rendered = render_vrf(vrf, self.local_as).to_string();
        self.apply(&rendered, short_name(&vrf.name)).await?;
        match self.query_vrf_facts(vni).await {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                warn!("Could not read EVPN facts for vni {vni}: {e}");
                Ok(None)
            }
        }
    }

    async fn tear_down_vrf(&self, vrf: &Vrf) -> Result<(), FrrErr> {
        let rendered = render_vrf_teardown(vrf, self.local_as).to_string();
        self.apply(&rendered, short_name(&vrf.name)).await
    }

    fn report_vrf(&self, data: &ObjectData, metadata: Option<VrfMetadata>, component: Component) {
        if let Err(e) = self.db.update_vrf_status(
            &data.name,
            &data.resource_version,
            &data.notification_id,
            metadata,
            component,
        ) {
            debug!("VRF status report for '{}' rejected: {e}", data.name);
        }
    }

    async fn handle_vrf(&self, data: ObjectData) {
        let vrf = match self.db.get_vrf(&data.name) {
            Ok(vrf) => vrf,
            Err(e) => {
                warn!("FRR could not read VRF '{}': {e}", data.name);
                self.report_vrf(&data, None, errored(None, format!("read failed: {e}")));
                return;
            }
        };
        if vrf.resource_version != data.resource_version {
            warn!(
                "FRR notified about VRF '{}' at version {} but found {}",
                data.name, data.resource_version, vrf.resource_version
            );
            let prior = vrf.status.component(FRR_COMPONENT);
            self.report_vrf(
                &data,
                None,
                errored(prior, "resource version moved".to_string()),
            );
            return;
        }
        let prior = vrf.status.component(FRR_COMPONENT).cloned();
        if vrf.status.oper == OperStatus::ToBeDeleted {
            match self.tear_down_vrf(&vrf).await {
                Ok(()) => self.report_vrf(&data, None, Component::success(FRR_COMPONENT)),
                Err(e) => self.report_vrf(&data, None, errored(prior.as_ref(), e.to_string())),
            }
            return;
        }
        // set-up and update converge the same way: frr-reload diffs the
        // rendered config against the daemon's running state
        match self.set_up_vrf(&vrf).await {
            Ok(metadata) => {
                self.report_vrf(&data, metadata, Component::success(FRR_COMPONENT));
            }
            Err(e) => self.report_vrf(&data, None, errored(prior.as_ref(), e.to_string())),
        }
    }

    fn report_svi(&self, data: &ObjectData, component: Component) {
        if let Err(e) = self.db.update_svi_status(
            &data.name,
            &data.resource_version,
            &data.notification_id,
            component,
        ) {
            debug!("SVI status report for '{}' rejected: {e}", data.name);
        }
    }

    async fn set_up_svi(&self, svi: &Svi) -> Result<(), FrrErr> {
        let rendered = render_svi(svi, self.local_as).to_string();
        self.apply(&rendered, short_name(&svi.name)).await
    }

    async fn tear_down_svi(&self, svi: &Svi) -> Result<(), FrrErr> {
        let rendered = render_svi_teardown(svi, self.local_as).to_string();
        self.apply(&rendered, short_name(&svi.name)).await
    }

    async fn handle_svi(&self, data: ObjectData) {
        let svi = match self.db.get_svi(&data.name) {
            Ok(svi) => svi,
            Err(e) => {
                warn!("FRR could not read SVI '{}': {e}", data.name);
                self.report_svi(&data, errored(None, format!("read failed: {e}")));
                return;
            }
        };
        if svi.resource_version != data.resource_version {
            warn!(
                "FRR notified about SVI '{}' at version {} but found {}",
                data.name, data.resource_version, svi.resource_version
            );
            let prior = svi.status.component(FRR_COMPONENT);
            self.report_svi(&data, errored(prior, "resource version moved".to_string()));
            return;
        }
        let prior = svi.status.component(FRR_COMPONENT).cloned();
        let result = if svi.status.oper == OperStatus::ToBeDeleted {
            self.tear_down_svi(&svi).await
        } else {
            self.set_up_svi(&svi).await
        };
        match result {
            Ok(()) => self.report_svi(&data, Component::success(FRR_COMPONENT)),
            Err(e) => self.report_svi(&data, errored(prior.as_ref(), e.to_string())),
        }
    }
}

#[async_trait]
impl EventHandler for FrrModule {
    async fn handle_event(&self, event: &str, data: ObjectData) {
        debug!("FRR received {event} '{}'", data.name);
        match event {
            "vrf" => self.handle_vrf(data).await,
            "svi" => self.handle_svi(data).await,
            other => warn!("FRR received unknown event '{other}'"),
        }
    }
}

/// preReplay: put the daemon back on its basic configuration so the
/// replayed notifications rebuild state from scratch.
pub struct FrrActionHandler {
    running_conf: PathBuf,
    basic_conf: PathBuf,
    backup_conf: PathBuf,
}

impl Default for FrrActionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrrActionHandler {
    pub fn new() -> Self {
        Self {
            running_conf: PathBuf::from("/etc/frr/frr.conf"),
            basic_conf: PathBuf::from("/etc/frr/frr-basic.conf"),
            backup_conf: PathBuf::from("/etc/frr/frr.conf.bak"),
        }
    }

    pub fn with_paths(running: PathBuf, basic: PathBuf, backup: PathBuf) -> Self {
        Self {
            running_conf: running,
            basic_conf: basic,
            backup_conf: backup,
        }
    }

    async fn pre_replay(&self) -> Result<(), String> {
        tokio::fs::rename(&self.running_conf, &self.backup_conf)
            .await
            .map_err(|e| format!("backing up running config: {e}"))?;
        tokio::fs::copy(&self.basic_conf, &self.running_conf)
            .await
            .map_err(|e| format!("restoring basic config: {e}"))?;
        let status = Command::new("systemctl")
            .args(["restart", "frr"])
            .status()
            .await
            .map_err(|e| format!("restarting frr: {e}"))?;
        if !status.success() {
            return Err("restart of the frr daemon failed".to_string());
        }
        info!("FRR pre-replay completed: daemon restarted on basic config");
        Ok(())
    }
}

#[async_trait]
impl ActionHandler for FrrActionHandler {
    async fn handle_action(&self, action: &str, data: ActionData) {
        let result = match action {
            PRE_REPLAY => self.pre_replay().await,
            other => {
                warn!("FRR received unknown action '{other}'");
                Err(format!("unknown action '{other}'"))
            }
        };
        let _ = data.err_tx.send(result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_component_escalates() {
        let first = errored(None, "boom".to_string());
        assert_eq!(first.status, CompStatus::Error);
        assert_eq!(first.timer, Duration::from_secs(2));

        let second = errored(Some(&first), "boom again".to_string());
        assert_eq!(second.timer, Duration::from_secs(4));
        assert_eq!(second.details, "boom again");

        // a success in between resets the clock
        let after_success = errored(Some(&Component::success(FRR_COMPONENT)), "x".to_string());
        assert_eq!(after_success.timer, Duration::from_secs(2));
    }

    #[test]
    fn test_vni_facts_decode() {
        let raw = r#"{
            "vni": 100,
            "type": "L3",
            "inKernel": "True",
            "rd": "10.0.0.1:2",
            "rmac": "aa:bb:cc:dd:ee:ff",
            "advertiseGatewayMacip": "n/a",
            "importRts": ["65000:100"],
            "exportRts": ["65000:100"]
        }"#;
        let facts: BgpL2vpnVni = serde_json::from_str(raw).unwrap();
        assert_eq!(facts.vni, 100);
        assert_eq!(facts.rd, "10.0.0.1:2");
        assert_eq!(facts.in_kernel, "True");
        assert_eq!(facts.rmac.parse::<macaddr::MacAddr6>().unwrap().to_string().to_lowercase(), "aa:bb:cc:dd:ee:ff");
    }
}
