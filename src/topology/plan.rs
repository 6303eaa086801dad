//! Fully resolved topology plan.
//!
//! A plan is what the emulation platform is handed: every switch, host and
//! link with names, interface names, addresses and VLAN attributes already
//! decided. Nothing in the plan refers to the platform's own handles.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::debug;
use serde::Serialize;

use super::types::{
    interface_name, ControllerConfig, Endpoint, HostId, HostKind, HostNode, Link, LinkConfig, LinkId, NodeRef,
    SwitchConfig, SwitchId, SwitchNode,
};
use crate::error::{Result, ScenarioError};
use crate::ip::{mac_for_address, HostAddressRegistry};
use crate::vlan::VlanPortModel;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerConfig>,
    networks: Vec<Ipv4Net>,
    switches: Vec<SwitchNode>,
    hosts: Vec<HostNode>,
    links: Vec<Link>,
    #[serde(skip)]
    addresses: HostAddressRegistry,
}

impl TopologyPlan {
    pub fn new(controller: Option<ControllerConfig>) -> Self {
        TopologyPlan {
            controller,
            ..Default::default()
        }
    }

    /// Note a network allocated for this topology.
    pub fn record_network(&mut self, network: Ipv4Net) {
        self.networks.push(network);
    }

    /// Controller a switch connects to: its own, else the plan's.
    pub fn controller_for<'a>(&'a self, switch: &'a SwitchNode) -> Option<&'a ControllerConfig> {
        switch.config.controller.as_ref().or(self.controller.as_ref())
    }

    pub fn networks(&self) -> &[Ipv4Net] {
        &self.networks
    }

    pub fn add_switch(&mut self, name: impl Into<String>, config: SwitchConfig) -> Result<SwitchId> {
        let name = name.into();
        self.ensure_unique(&name)?;
        debug!("Adding switch {}", name);
        self.switches.push(SwitchNode {
            name,
            config,
            vlans: VlanPortModel::new(),
            // switch ports start at eth1
            interfaces: 1,
        });
        Ok(SwitchId(self.switches.len() - 1))
    }

    /// Add a host. Its address, if any, is registered and must be unique.
    pub fn add_host(&mut self, name: impl Into<String>, kind: HostKind, address: Option<Ipv4Net>) -> Result<HostId> {
        let name = name.into();
        self.ensure_unique(&name)?;
        if let Some(address) = address {
            self.addresses.assign(address.addr(), &name)?;
        }
        debug!("Adding host {} at {:?}", name, address.map(|a| a.to_string()));
        self.hosts.push(HostNode {
            name,
            kind,
            address,
            mac: address.map(|a| mac_for_address(a.addr())),
            vlan: None,
            open_ports: Vec::new(),
            interfaces: 0,
        });
        Ok(HostId(self.hosts.len() - 1))
    }

    /// Link two nodes, creating the next free interface on each.
    pub fn add_link(&mut self, a: impl Into<NodeRef>, b: impl Into<NodeRef>, config: LinkConfig) -> Result<LinkId> {
        let (a, b) = (a.into(), b.into());
        if a == b {
            return Err(ScenarioError::TopologyShape(format!(
                "cannot link {} to itself",
                self.node_name(a)?
            )));
        }
        let left = self.next_endpoint(a)?;
        let right = self.next_endpoint(b)?;
        let link = Link {
            left,
            right,
            config,
            nodes: (a, b),
        };
        debug!("Adding link {}", link);
        self.links.push(link);
        Ok(LinkId(self.links.len() - 1))
    }

    pub fn switch(&self, id: SwitchId) -> Option<&SwitchNode> {
        self.switches.get(id.0)
    }

    pub fn switch_mut(&mut self, id: SwitchId) -> Option<&mut SwitchNode> {
        self.switches.get_mut(id.0)
    }

    pub fn host(&self, id: HostId) -> Option<&HostNode> {
        self.hosts.get(id.0)
    }

    pub fn host_mut(&mut self, id: HostId) -> Option<&mut HostNode> {
        self.hosts.get_mut(id.0)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id.0)
    }

    pub fn switches(&self) -> &[SwitchNode] {
        &self.switches
    }

    pub fn switches_mut(&mut self) -> &mut [SwitchNode] {
        &mut self.switches
    }

    pub fn hosts(&self) -> &[HostNode] {
        &self.hosts
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn host_by_name(&self, name: &str) -> Option<&HostNode> {
        self.hosts.iter().find(|h| h.name == name)
    }

    pub fn addresses(&self) -> &HostAddressRegistry {
        &self.addresses
    }

    pub fn is_assigned(&self, address: &Ipv4Addr) -> bool {
        self.addresses.is_assigned(address)
    }

    /// The VLAN model and port name of `switch`'s end of `link`.
    pub fn switch_port(&mut self, link: LinkId, switch: SwitchId) -> Result<(&mut VlanPortModel, String)> {
        let port = self
            .links
            .get(link.0)
            .and_then(|l| l.interface_on(NodeRef::Switch(switch)))
            .map(str::to_string)
            .ok_or_else(|| ScenarioError::TopologyShape(format!("link {} does not touch switch {}", link.0, switch.0)))?;
        let node = self
            .switches
            .get_mut(switch.0)
            .ok_or_else(|| ScenarioError::TopologyShape(format!("no switch {}", switch.0)))?;
        Ok((&mut node.vlans, port))
    }

    /// The links that touch `node`, in creation order.
    pub fn links_of(&self, node: NodeRef) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, l)| l.nodes.0 == node || l.nodes.1 == node)
            .map(|(i, l)| (LinkId(i), l))
    }

    /// Check the plan is safe to hand to the platform.
    ///
    /// Every addressed host must sit inside a recorded network and every
    /// host must be linked to something.
    pub fn validate(&self) -> Result<()> {
        for host in &self.hosts {
            if let Some(address) = host.address {
                if !self.networks.is_empty() && !self.networks.iter().any(|n| n.contains(&address.addr())) {
                    return Err(ScenarioError::TopologyShape(format!(
                        "host {} address {} lies outside every allocated network",
                        host.name, address
                    )));
                }
            }
            if host.interfaces == 0 {
                return Err(ScenarioError::TopologyShape(format!("host {} is not linked", host.name)));
            }
        }
        Ok(())
    }

    fn node_name(&self, node: NodeRef) -> Result<&str> {
        match node {
            NodeRef::Switch(id) => self.switches.get(id.0).map(|s| s.name.as_str()),
            NodeRef::Host(id) => self.hosts.get(id.0).map(|h| h.name.as_str()),
        }
        .ok_or_else(|| ScenarioError::TopologyShape(format!("unknown node {:?}", node)))
    }

    fn next_endpoint(&mut self, node: NodeRef) -> Result<Endpoint> {
        let (name, counter) = match node {
            NodeRef::Switch(id) => self.switches.get_mut(id.0).map(|s| (&s.name, &mut s.interfaces)),
            NodeRef::Host(id) => self.hosts.get_mut(id.0).map(|h| (&h.name, &mut h.interfaces)),
        }
        .ok_or_else(|| ScenarioError::TopologyShape(format!("unknown node {:?}", node)))?;
        let interface = interface_name(name, *counter);
        *counter += 1;
        Ok(Endpoint {
            node: name.clone(),
            interface,
        })
    }

    pub(crate) fn ensure_unique(&self, name: &str) -> Result<()> {
        let taken = self.switches.iter().any(|s| s.name == name) || self.hosts.iter().any(|h| h.name == name);
        if taken {
            return Err(ScenarioError::TopologyShape(format!("node name {} is already used", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_interface_numbering() {
        let mut plan = TopologyPlan::new(None);
        let s0 = plan.add_switch("s0", SwitchConfig::default()).unwrap();
        let h0 = plan.add_host("h0", HostKind::Host, Some(net("10.0.0.2/24"))).unwrap();
        let h1 = plan.add_host("h1", HostKind::Host, Some(net("10.0.0.3/24"))).unwrap();
        let l0 = plan.add_link(h0, s0, LinkConfig::default()).unwrap();
        let l1 = plan.add_link(s0, h1, LinkConfig::default()).unwrap();

        assert_eq!(plan.link(l0).unwrap().left.interface, "h0-eth0");
        assert_eq!(plan.link(l0).unwrap().right.interface, "s0-eth1");
        assert_eq!(plan.link(l1).unwrap().left.interface, "s0-eth2");
        assert_eq!(plan.link(l1).unwrap().right.interface, "h1-eth0");
        assert_eq!(plan.links_of(NodeRef::Switch(s0)).count(), 2);

        let (_, port) = plan.switch_port(l1, s0).unwrap();
        assert_eq!(port, "s0-eth2");
        assert!(plan.switch_port(l1, SwitchId(7)).is_err());
    }

    #[test]
    fn test_switch_controller_overrides_plan() {
        let mut plan = TopologyPlan::new(Some(ControllerConfig::Reference));
        let pox = ControllerConfig::Pox {
            component: "forwarding.l2_learning".to_string(),
        };
        plan.add_switch("s0", SwitchConfig::default()).unwrap();
        plan.add_switch(
            "s1",
            SwitchConfig {
                controller: Some(pox.clone()),
                ..Default::default()
            },
        )
        .unwrap();

        let switches = plan.switches();
        assert_eq!(plan.controller_for(&switches[0]), Some(&ControllerConfig::Reference));
        assert_eq!(plan.controller_for(&switches[1]), Some(&pox));

        let standalone = TopologyPlan::new(None);
        assert_eq!(standalone.controller_for(&switches[0]), None);
    }

    #[test]
    fn test_duplicate_names_and_addresses() {
        let mut plan = TopologyPlan::new(None);
        plan.add_switch("s0", SwitchConfig::default()).unwrap();
        assert!(matches!(
            plan.add_host("s0", HostKind::Host, None),
            Err(ScenarioError::TopologyShape(_))
        ));
        plan.add_host("h0", HostKind::Host, Some(net("10.0.0.2/24"))).unwrap();
        assert!(matches!(
            plan.add_host("h1", HostKind::Host, Some(net("10.0.0.2/24"))),
            Err(ScenarioError::AddressConflict { .. })
        ));
        let h0 = plan.host_by_name("h0").unwrap();
        assert_eq!(h0.mac.as_deref(), Some("02:00:0a:00:00:02"));
        assert_eq!(h0.default_interface(), "h0-eth0");
    }

    #[test]
    fn test_self_link_rejected() {
        let mut plan = TopologyPlan::new(None);
        let s0 = plan.add_switch("s0", SwitchConfig::default()).unwrap();
        assert!(plan.add_link(s0, s0, LinkConfig::default()).is_err());
    }

    #[test]
    fn test_validate() {
        let mut plan = TopologyPlan::new(None);
        plan.record_network(net("10.0.0.0/24"));
        let s0 = plan.add_switch("s0", SwitchConfig::default()).unwrap();
        let h0 = plan.add_host("h0", HostKind::Host, Some(net("10.0.0.2/24"))).unwrap();
        assert!(plan.validate().is_err());
        plan.add_link(h0, s0, LinkConfig::default()).unwrap();
        plan.validate().unwrap();

        let h1 = plan.add_host("h1", HostKind::Host, Some(net("10.9.0.2/24"))).unwrap();
        plan.add_link(h1, s0, LinkConfig::default()).unwrap();
        assert!(plan.validate().is_err());
    }
}
