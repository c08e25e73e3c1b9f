// SPDX-License-Identifier: Apache-2.0

//! Renderers producing the FRR stanzas for the managed objects

use infradb::objects::{Svi, Vrf};
use std::fmt::Display;

pub const MARKER: &str = "!";

/// Accumulates FRR configuration as a list of stanzas, each a block of
/// lines. Separator markers are not stored: rendering emits one marker
/// line ahead of every stanza and a closing one at the end, so an empty
/// builder renders to nothing and markers can never double up.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    stanzas: Vec<Vec<String>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new stanza beginning with `header`.
    pub fn stanza(&mut self, header: impl Into<String>) -> &mut Self {
        self.stanzas.push(vec![header.into()]);
        self
    }

    /// Add a line to the stanza opened last.
    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        match self.stanzas.last_mut() {
            Some(stanza) => stanza.push(line.into()),
            None => self.stanzas.push(vec![line.into()]),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stanzas.is_empty()
    }
}

impl Display for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for stanza in &self.stanzas {
            writeln!(f, "{MARKER}")?;
            for line in stanza {
                writeln!(f, "{line}")?;
            }
        }
        if !self.stanzas.is_empty() {
            writeln!(f, "{MARKER}")?;
        }
        Ok(())
    }
}

/// Short (interface-friendly) name of an object: the last path segment of
/// its resource name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Stanzas for a VXLAN-extended VRF: the vrf/vni block plus its BGP
/// instance with EVPN advertisement. A VRF without a VNI needs nothing
/// from FRR.
pub fn render_vrf(vrf: &Vrf, local_as: u32) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    let Some(vni) = vrf.spec.vni else {
        return cfg;
    };
    let name = short_name(&vrf.name);

    cfg.stanza(format!("vrf {name}"))
        .line(format!(" vni {vni}"))
        .line("exit-vrf");
    cfg.stanza(format!("router bgp {local_as} vrf {name}"))
        .line(" bgp router-id auto")
        .line(" no bgp ebgp-requires-policy")
        .line(" address-family ipv4 unicast")
        .line("  redistribute connected")
        .line("  redistribute static")
        .line(" exit-address-family")
        .line(" address-family l2vpn evpn")
        .line("  advertise ipv4 unicast")
        .line(" exit-address-family")
        .line("exit");
    cfg
}

/// Tear-down stanzas for a VRF.
pub fn render_vrf_teardown(vrf: &Vrf, local_as: u32) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    if vrf.spec.vni.is_none() {
        return cfg;
    }
    let name = short_name(&vrf.name);
    cfg.stanza(format!("no router bgp {local_as} vrf {name}"));
    cfg.stanza(format!("no vrf {name}"));
    cfg
}

/// Stanzas for an SVI with BGP peering towards the attached hosts: a
/// listen range per gateway prefix inside the VRF's BGP instance.
pub fn render_svi(svi: &Svi, local_as: u32) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    if !svi.spec.enable_bgp {
        return cfg;
    }
    let vrf = short_name(&svi.spec.vrf);
    let peer_group = format!("{}-peers", short_name(&svi.name));
    let Some(remote_as) = svi.spec.remote_as else {
        return cfg;
    };

    cfg.stanza(format!("router bgp {local_as} vrf {vrf}"))
        .line(format!(" neighbor {peer_group} peer-group"))
        .line(format!(" neighbor {peer_group} remote-as {remote_as}"));
    for prefix in &svi.spec.gateway_ips {
        cfg.line(format!(
            " bgp listen range {} peer-group {peer_group}",
            prefix.trunc()
        ));
    }
    cfg.line("exit");
    cfg
}

/// Tear-down stanzas for an SVI's peering.
pub fn render_svi_teardown(svi: &Svi, local_as: u32) -> ConfigBuilder {
    let mut cfg = ConfigBuilder::new();
    if !svi.spec.enable_bgp {
        return cfg;
    }
    let vrf = short_name(&svi.spec.vrf);
    let peer_group = format!("{}-peers", short_name(&svi.name));
    cfg.stanza(format!("router bgp {local_as} vrf {vrf}"))
        .line(format!(" no neighbor {peer_group} peer-group"))
        .line("exit");
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use infradb::objects::svi::SviSpecBuilder;
    use infradb::objects::vrf::VrfSpecBuilder;
    use ipnet::IpNet;
    use macaddr::MacAddr6;

    fn sample_vrf(vni: Option<u32>) -> Vrf {
        let spec = VrfSpecBuilder::default().vni(vni).build().unwrap();
        Vrf::new("//network.opiproject.org/vrfs/blue", spec, &[])
    }

    #[test]
    fn test_vrf_without_vni_renders_nothing() {
        let rendered = render_vrf(&sample_vrf(None), 65000);
        assert!(rendered.is_empty());
        assert!(rendered.to_string().is_empty());
    }

    #[test]
    fn test_vrf_render() {
        let rendered = render_vrf(&sample_vrf(Some(100)), 65000).to_string();
        assert!(rendered.contains("vrf blue\n"));
        assert!(rendered.contains(" vni 100\n"));
        assert!(rendered.contains("router bgp 65000 vrf blue\n"));
        assert!(rendered.contains("advertise ipv4 unicast"));
    }

    #[test]
    fn test_vrf_teardown_render() {
        let rendered = render_vrf_teardown(&sample_vrf(Some(100)), 65000).to_string();
        assert!(rendered.contains("no router bgp 65000 vrf blue\n"));
        assert!(rendered.contains("no vrf blue\n"));
    }

    #[test]
    fn test_svi_render() {
        let spec = SviSpecBuilder::default()
            .vrf("//network.opiproject.org/vrfs/blue".to_string())
            .logical_bridge("//network.opiproject.org/bridges/lb9".to_string())
            .mac_address("aa:bb:cc:dd:ee:ff".parse::<MacAddr6>().unwrap())
            .gateway_ips(vec!["10.1.2.1/24".parse::<IpNet>().unwrap()])
            .enable_bgp(true)
            .remote_as(Some(65100))
            .build()
            .unwrap();
        let svi = Svi::new("//network.opiproject.org/svis/s1", spec, &[]);

        let rendered = render_svi(&svi, 65000).to_string();
        assert!(rendered.contains("router bgp 65000 vrf blue\n"));
        assert!(rendered.contains(" neighbor s1-peers remote-as 65100\n"));
        assert!(rendered.contains(" bgp listen range 10.1.2.0/24 peer-group s1-peers\n"));

        let teardown = render_svi_teardown(&svi, 65000).to_string();
        assert!(teardown.contains(" no neighbor s1-peers peer-group\n"));
    }

    #[test]
    fn test_svi_without_bgp_renders_nothing() {
        let spec = SviSpecBuilder::default()
            .vrf("//network.opiproject.org/vrfs/blue".to_string())
            .logical_bridge("//network.opiproject.org/bridges/lb9".to_string())
            .mac_address("aa:bb:cc:dd:ee:ff".parse::<MacAddr6>().unwrap())
            .build()
            .unwrap();
        let svi = Svi::new("//network.opiproject.org/svis/s1", spec, &[]);
        assert!(render_svi(&svi, 65000).is_empty());
    }

    #[test]
    fn test_stanzas_are_singly_separated() {
        let rendered = render_vrf(&sample_vrf(Some(100)), 65000).to_string();
        // two stanzas, three separators, no doubled markers
        assert_eq!(rendered.matches("!\n").count(), 3);
        assert!(!rendered.contains("!\n!\n"));
        assert!(rendered.starts_with("!\n"));
        assert!(rendered.ends_with("!\n"));
    }
}
