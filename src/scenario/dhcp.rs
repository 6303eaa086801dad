//! DHCP exercises.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use super::sniffing::limit_host_link;
use super::{base_task, HostCommand, Question, Scenario, ScenarioContext};
use crate::error::Result;
use crate::topology::{
    DhcpdConfig, FailMode, HostId, HostKind, KaliConfig, LinkConfig, SwitchConfig, SwitchId, TopologyPlan,
};

const DHCP_PREFIX_LEN: u8 = 27;

/// A DHCP server and an unaddressed Kali machine on one switch.
#[derive(Debug, Clone)]
pub struct DhcpNetwork {
    pub plan: TopologyPlan,
    pub network: Ipv4Net,
    pub switch: SwitchId,
    pub dhcpd: HostId,
    pub kali: HostId,
    /// Addresses the server can still lease, lowest first
    pub leasable: Vec<Ipv4Addr>,
}

impl AsRef<TopologyPlan> for DhcpNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.plan
    }
}

impl AsMut<TopologyPlan> for DhcpNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.plan
    }
}

impl DhcpNetwork {
    fn dhcpd_config(&self) -> Option<&DhcpdConfig> {
        match &self.plan.host(self.dhcpd)?.kind {
            HostKind::Dhcpd(config) => Some(config),
            _ => None,
        }
    }

    fn dhcpd_ip(&self) -> String {
        self.plan
            .host(self.dhcpd)
            .and_then(|h| h.ip())
            .map(|ip| ip.to_string())
            .unwrap_or_default()
    }
}

/// The server takes the lowest address of a /27; Kali waits for a lease.
pub fn build_dhcp_network(ctx: &mut ScenarioContext<'_>) -> Result<DhcpNetwork> {
    let network = ctx.allocate(DHCP_PREFIX_LEN)?;
    let mut plan = TopologyPlan::new(None);
    plan.record_network(network);
    let mut pool = ctx.host_pool(network);

    let switch = plan.add_switch(
        "s1",
        SwitchConfig {
            fail_mode: FailMode::Standalone,
            ..Default::default()
        },
    )?;
    let server_ip = pool.take_first()?;
    let config = DhcpdConfig {
        default_lease_time: 120,
        min_lease_time: 60,
        max_lease_time: 120,
        subnet: Some(network),
    };
    let dhcpd = plan.add_host("dhcpd", HostKind::Dhcpd(config), Some(pool.interface(server_ip)?))?;
    let kali = plan.add_host(
        "kali",
        HostKind::Kali(KaliConfig::default().with_packages(["yersinia", "wireshark"])),
        None,
    )?;
    plan.add_link(switch, dhcpd, LinkConfig::default())?;
    plan.add_link(switch, kali, LinkConfig::default())?;

    Ok(DhcpNetwork {
        plan,
        network,
        switch,
        dhcpd,
        kali,
        leasable: pool.remaining().to_vec(),
    })
}

/// Write the server configuration and start the daemon on its interface.
fn start_dhcpd(net: &DhcpNetwork) -> Vec<HostCommand> {
    let (Some(server), Some(config)) = (net.plan.host(net.dhcpd), net.dhcpd_config()) else {
        return Vec::new();
    };
    vec![
        HostCommand::new(
            &server.name,
            format!("printf '%s' '{}' > /etc/dhcp/dhcpd.conf", config.render()),
        ),
        HostCommand::new(
            &server.name,
            format!("/usr/sbin/dhcpd --no-pid {}", server.default_interface()),
        ),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct DhcpIntro;

impl Scenario for DhcpIntro {
    type Network = DhcpNetwork;
    const NAME: &'static str = "DHCP Example";
    const WEIGHT: i32 = 55;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<DhcpNetwork> {
        build_dhcp_network(ctx)
    }

    fn setup(&self, _ctx: &mut ScenarioContext<'_>, net: &mut DhcpNetwork) -> Result<Vec<HostCommand>> {
        Ok(start_dhcpd(net))
    }

    fn task(&self, net: &DhcpNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.push(
            "In this task your Kali machine is not assigned an IP on the network. \
             There is a DHCP server able to assign you one."
                .to_string(),
        );
        task.push("Answer the following questions:".to_string());
        task
    }

    fn questions(&self, net: &DhcpNetwork) -> Vec<Question> {
        let adapter = net
            .plan
            .host(net.kali)
            .map(|k| k.default_interface())
            .unwrap_or_default();
        let first = net.network.hosts().next().map(|ip| ip.to_string()).unwrap_or_default();
        let last = net.network.hosts().last().map(|ip| ip.to_string()).unwrap_or_default();
        let lease = net
            .dhcpd_config()
            .map(|c| c.default_lease_time.to_string())
            .unwrap_or_default();
        vec![
            Question::ask(format!("What is the IP of the {} adapter", adapter), "None (0.0.0.0)"),
            Question::ask(
                format!("In a terminal use dhclient on the {} adapter, what is the IP now", adapter),
                format!("Any IP in the range {} to {} is valid", first, last),
            ),
            Question::ask(
                "Using wireshark/tcpdump find a DHCP ACK or OFFER packet and find the following information within it:\n\tServer identifier/ip",
                net.dhcpd_ip(),
            ),
            Question::ask("\tIP Lease time", lease),
        ]
    }
}

/// The DHCP example, attacked by leasing every address.
#[derive(Debug, Clone, Default)]
pub struct DhcpStarvation;

impl DhcpStarvation {
    pub const KALI_BANDWIDTH_MBPS: f64 = 0.25;
}

impl Scenario for DhcpStarvation {
    type Network = DhcpNetwork;
    const NAME: &'static str = "DHCP Starvation";
    const WEIGHT: i32 = 56;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<DhcpNetwork> {
        let mut net = build_dhcp_network(ctx)?;
        limit_host_link(&mut net.plan, net.kali, Self::KALI_BANDWIDTH_MBPS)?;
        Ok(net)
    }

    fn setup(&self, _ctx: &mut ScenarioContext<'_>, net: &mut DhcpNetwork) -> Result<Vec<HostCommand>> {
        Ok(start_dhcpd(net))
    }

    fn task(&self, net: &DhcpNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.extend(
            [
                "DHCP servers assign IP addresses within a set range for a set amount of time. This makes them vulnerable \
                 to 'starvation' attacks, where a malicious device requests every IP by pretending to be many devices \
                 simultaneously.",
                "In this task you'll be performing a starvation attack. To do this you'll need to use Yersinia. \
                 NOTE: Do NOT run dhclient until told.",
                "Answer the following questions:",
            ]
            .map(String::from),
        );
        task
    }

    fn questions(&self, net: &DhcpNetwork) -> Vec<Question> {
        let hosts = net.network.hosts().count();
        let offered = net.leasable.first().map(|ip| ip.to_string()).unwrap_or_default();
        vec![
            Question::statement(
                "Open wireshark/tcpdump to capture packets on the network and use Yersinia to send a RAW DHCP packet",
            ),
            Question::ask("What IP responded", net.dhcpd_ip()),
            Question::ask("What IP did it respond to", "255.255.255.255"),
            Question::ask(
                "What are the network address and netmask for the network that responded",
                format!("{} & {}", net.network.network(), net.network.netmask()),
            ),
            Question::ask("How many IP addresses could be used in this network", hosts.to_string()),
            Question::ask("What IP was offered in the response", offered),
            Question::ask(
                "Now use Yersinia to send DISCOVER packets, these will be sent continuously until you stop them in \
                 'list attacks'. After 10+ seconds check wireshark, filter for responses from the server offering IP \
                 addresses (bootp.option.dhcp==2). How many offers were received",
                format!(
                    "Should be {} as all IP addresses in the network are unused excluding the DHCP server IP.",
                    hosts.saturating_sub(1)
                ),
            ),
            Question::ask(
                "How long before all offers ceased, and the DHCP server was 'starved'",
                format!(
                    "~{:.2} seconds during testing, but any reasonable answer is acceptable.",
                    0.015 * hosts.saturating_sub(1) as f64
                ),
            ),
            Question::ask(
                "Run the starvation attack again, after a short wait attempt to use dhclient to get an IP address, does this work",
                "No",
            ),
        ]
    }
}
