//! Topology type definitions.
//!
//! This file contains the node, link and per-kind configuration types a
//! topology plan is made of. Every node kind carries its configuration
//! explicitly so the emulation platform never has to guess defaults.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::vlan::{VlanId, VlanPortModel};

pub const VNC_DEFAULT: u16 = 5900;
pub const WEB_DEFAULT: u16 = 6080;

/// Index of a switch within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SwitchId(pub usize);

/// Index of a host within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HostId(pub usize);

/// Index of a link within its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinkId(pub usize);

/// Either end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Switch(SwitchId),
    Host(HostId),
}

impl From<SwitchId> for NodeRef {
    fn from(id: SwitchId) -> Self {
        NodeRef::Switch(id)
    }
}

impl From<HostId> for NodeRef {
    fn from(id: HostId) -> Self {
        NodeRef::Host(id)
    }
}

/// What an Open vSwitch bridge does when no controller is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Acts as a learning switch on its own
    #[default]
    Standalone,
    /// Forwards only what the controller installed
    Secure,
}

/// Spanning tree protocol run by a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StpMode {
    #[default]
    Disabled,
    Stp,
    Rstp,
}

/// Controller a plan's switches connect to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerConfig {
    /// The emulator's reference controller
    Reference,
    /// POX running the named component
    Pox { component: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(default)]
    pub fail_mode: FailMode,
    #[serde(default)]
    pub stp: StpMode,
    /// Overrides the plan-wide controller for this switch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerConfig>,
}

impl SwitchConfig {
    pub fn rstp() -> Self {
        SwitchConfig {
            fail_mode: FailMode::Standalone,
            stp: StpMode::Rstp,
            controller: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_limit_mbps: Option<f64>,
}

impl LinkConfig {
    pub fn limited(mbps: f64) -> Self {
        LinkConfig {
            bandwidth_limit_mbps: Some(mbps),
        }
    }
}

/// Attacker workstation reachable over VNC and a web viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KaliConfig {
    pub resolution: String,
    pub vnc_port: u16,
    pub web_port: u16,
    pub publish_all_ports: bool,
    /// Installed once the container is running
    pub packages: Vec<String>,
}

impl Default for KaliConfig {
    fn default() -> Self {
        KaliConfig {
            resolution: "1920x1080x24".to_string(),
            vnc_port: VNC_DEFAULT,
            web_port: WEB_DEFAULT,
            publish_all_ports: true,
            packages: Vec::new(),
        }
    }
}

impl KaliConfig {
    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }
}

/// ISC DHCP server settings, lease times in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpdConfig {
    pub default_lease_time: u32,
    pub min_lease_time: u32,
    pub max_lease_time: u32,
    pub subnet: Option<Ipv4Net>,
}

impl DhcpdConfig {
    /// The `dhcpd.conf` body serving every host address of the subnet.
    pub fn render(&self) -> String {
        let mut conf = format!(
            "authoritative;\ndefault-lease-time {};\nmin-lease-time {};\nmax-lease-time {};\n",
            self.default_lease_time, self.min_lease_time, self.max_lease_time
        );
        if let Some(subnet) = self.subnet {
            let first = Ipv4Addr::from(u32::from(subnet.network()) + 1);
            let last = Ipv4Addr::from(u32::from(subnet.broadcast()).saturating_sub(1));
            conf.push_str(&format!(
                "subnet {} netmask {} {{\noption subnet-mask {};\noption broadcast-address {};\nrange {} {};\n}}\n",
                subnet.network(),
                subnet.netmask(),
                subnet.netmask(),
                subnet.broadcast(),
                first,
                last
            ));
        }
        conf
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpdConfig {
    pub users: Vec<FtpUser>,
}

/// The kind of container a host runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostKind {
    /// Plain emulated host
    Host,
    Kali(KaliConfig),
    Dhcpd(DhcpdConfig),
    Ftpd(FtpdConfig),
}

impl HostKind {
    /// Container image the host is provisioned from; plain hosts need none.
    pub fn image(&self) -> Option<&'static str> {
        match self {
            HostKind::Host => None,
            HostKind::Kali(_) => Some("segnet/kali"),
            HostKind::Dhcpd(_) => Some("segnet/dhcpd"),
            HostKind::Ftpd(_) => Some("segnet/ftpd"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchNode {
    pub name: String,
    pub config: SwitchConfig,
    pub vlans: VlanPortModel,
    #[serde(skip)]
    pub(crate) interfaces: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostNode {
    pub name: String,
    #[serde(flatten)]
    pub kind: HostKind,
    /// Interface address with prefix; `None` for hosts configured later (e.g. by DHCP)
    pub address: Option<Ipv4Net>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// VLAN the host's access port belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlan: Option<VlanId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub open_ports: Vec<u16>,
    #[serde(skip)]
    pub(crate) interfaces: usize,
}

impl HostNode {
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.address.map(|a| a.addr())
    }

    /// Name of the host's first interface.
    pub fn default_interface(&self) -> String {
        interface_name(&self.name, 0)
    }
}

/// One end of a link: the node and the interface created on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub node: String,
    pub interface: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub left: Endpoint,
    pub right: Endpoint,
    pub config: LinkConfig,
    #[serde(skip)]
    pub(crate) nodes: (NodeRef, NodeRef),
}

impl Link {
    /// The interface this link created on `node`, if it touches it.
    pub fn interface_on(&self, node: NodeRef) -> Option<&str> {
        if self.nodes.0 == node {
            Some(&self.left.interface)
        } else if self.nodes.1 == node {
            Some(&self.right.interface)
        } else {
            None
        }
    }

    pub fn nodes(&self) -> (NodeRef, NodeRef) {
        self.nodes
    }
}

/// Interface names follow the emulator convention `<node>-eth<n>`.
pub fn interface_name(node: &str, index: usize) -> String {
    format!("{}-eth{}", node, index)
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.left.interface, self.right.interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dhcpd_render() {
        let conf = DhcpdConfig {
            default_lease_time: 120,
            min_lease_time: 60,
            max_lease_time: 120,
            subnet: Some("10.4.2.32/27".parse().unwrap()),
        };
        let text = conf.render();
        assert!(text.contains("default-lease-time 120;"));
        assert!(text.contains("subnet 10.4.2.32 netmask 255.255.255.224 {"));
        assert!(text.contains("range 10.4.2.33 10.4.2.62;"));
    }

    #[test]
    fn test_kali_defaults() {
        let kali = KaliConfig::default().with_packages(["ettercap-graphical", "dsniff"]);
        assert_eq!(kali.vnc_port, 5900);
        assert_eq!(kali.web_port, 6080);
        assert_eq!(kali.packages, vec!["ettercap-graphical", "dsniff"]);
    }

    #[test]
    fn test_switch_config_from_yaml() {
        let config: SwitchConfig = serde_yaml::from_str("stp: rstp").unwrap();
        assert_eq!(config, SwitchConfig::rstp());
        assert_eq!(interface_name("s3", 2), "s3-eth2");
    }
}
