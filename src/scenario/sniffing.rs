//! Credential sniffing exercises: a hub, then a learning switch, then a CAM-learning controller.

use ipnet::Ipv4Net;
use rand::Rng;

use super::{base_task, HostCommand, Question, Scenario, ScenarioContext};
use crate::error::{Result, ScenarioError};
use crate::topology::{
    ControllerConfig, FailMode, FtpUser, FtpdConfig, HostId, HostKind, KaliConfig, LinkConfig, NodeRef, SwitchConfig,
    SwitchId, TopologyPlan,
};

pub const FTP_USER: &str = "user";
const SNIFFING_PACKAGES: [&str; 3] = ["wireshark", "tcpdump", "ftp"];
const POISONING_PACKAGES: [&str; 2] = ["ettercap-graphical", "dsniff"];

/// A switch joining Kali, an FTP server and clients that keep logging in to it.
#[derive(Debug, Clone)]
pub struct SniffingNetwork {
    pub plan: TopologyPlan,
    pub subnet: Ipv4Net,
    pub switch: SwitchId,
    pub kali: HostId,
    pub ftpd: HostId,
    pub clients: Vec<HostId>,
    /// One password per client; the first is the valid one
    pub passwords: Vec<String>,
}

impl AsRef<TopologyPlan> for SniffingNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.plan
    }
}

impl AsMut<TopologyPlan> for SniffingNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.plan
    }
}

/// Kali, the FTP server and 1-4 clients take the highest addresses of a random /27-/29.
pub fn build_sniffing_network(
    ctx: &mut ScenarioContext<'_>,
    controller: Option<ControllerConfig>,
    switch: SwitchConfig,
    extra_packages: &[&str],
) -> Result<SniffingNetwork> {
    let mut plan = TopologyPlan::new(controller);
    let switch = plan.add_switch("s1", switch)?;

    let prefix_len = ctx.rng().gen_range(27..=29u8);
    let subnet = ctx.allocate(prefix_len)?;
    plan.record_network(subnet);
    let mut pool = ctx.host_pool(subnet);

    let kali_config = KaliConfig::default()
        .with_packages(SNIFFING_PACKAGES)
        .with_packages(extra_packages.iter().copied());
    let ip = pool.pop()?;
    let kali = plan.add_host("kali", HostKind::Kali(kali_config), Some(pool.interface(ip)?))?;
    plan.add_link(switch, kali, LinkConfig::default())?;

    let ip = pool.pop()?;
    let ftpd = plan.add_host("ftp", HostKind::Ftpd(FtpdConfig::default()), Some(pool.interface(ip)?))?;
    plan.add_link(switch, ftpd, LinkConfig::default())?;

    let client_count = ctx.rng().gen_range(1..5u32);
    let mut clients = Vec::new();
    for i in 0..client_count {
        let ip = pool.pop()?;
        let client = plan.add_host(format!("ftpc{}", i), HostKind::Host, Some(pool.interface(ip)?))?;
        plan.add_link(switch, client, LinkConfig::default())?;
        clients.push(client);
    }

    Ok(SniffingNetwork {
        plan,
        subnet,
        switch,
        kali,
        ftpd,
        clients,
        passwords: Vec::new(),
    })
}

/// 20 hex digit password.
fn generate_password<R: Rng + ?Sized>(rng: &mut R) -> String {
    let value: u128 = rng.gen::<u128>() & ((1u128 << 80) - 1);
    format!("{:020x}", value)
}

/// Create the FTP account and make every client log in every `wait` seconds.
///
/// Only the first client uses the account's real password.
pub fn add_ftp_traffic(
    ctx: &mut ScenarioContext<'_>,
    net: &mut SniffingNetwork,
    wait: u32,
) -> Result<Vec<HostCommand>> {
    net.passwords = (0..net.clients.len()).map(|_| generate_password(ctx.rng())).collect();
    let password = net.passwords.first().cloned().unwrap_or_default();

    let ftpd = net
        .plan
        .host_mut(net.ftpd)
        .ok_or_else(|| ScenarioError::TopologyShape("FTP server missing from plan".to_string()))?;
    ftpd.kind = HostKind::Ftpd(FtpdConfig {
        users: vec![FtpUser {
            username: FTP_USER.to_string(),
            password: password.clone(),
        }],
    });
    let server = ftpd.name.clone();
    let server_ip = ftpd.ip().map(|ip| ip.to_string()).unwrap_or_default();

    let mut commands = vec![
        HostCommand::new(&server, format!("adduser --disabled-password --gecos \"\" {}", FTP_USER)),
        HostCommand::new(&server, format!("echo '{}:{}' | chpasswd", FTP_USER, password)),
    ];
    for (client, password) in net.clients.iter().zip(&net.passwords) {
        if let Some(client) = net.plan.host(*client) {
            commands.push(HostCommand::new(
                &client.name,
                [
                    format!("watch -n {} 'ftp -n {} << EOF", wait, server_ip),
                    format!("quote USER {}", FTP_USER),
                    format!("quote PASS {}", password),
                    "quit".to_string(),
                    "EOF' &".to_string(),
                ]
                .join("\n"),
            ));
        }
    }
    Ok(commands)
}

fn sniffing_questions(net: &SniffingNetwork) -> Vec<Question> {
    let talkers: Vec<String> = net
        .clients
        .iter()
        .chain(std::iter::once(&net.ftpd))
        .filter_map(|id| net.plan.host(*id).and_then(|h| h.ip()))
        .map(|ip| ip.to_string())
        .collect();
    let credentials: String = net
        .passwords
        .iter()
        .map(|pw| format!("\n{}:{}", FTP_USER, pw))
        .collect();
    let valid = net.passwords.first().map(String::as_str).unwrap_or_default();
    vec![
        Question::ask("What host IPs are sending traffic on the network", talkers.join("\n")),
        Question::ask("What protocol(s) are being used", "File Transfer Protocol (ftp)"),
        Question::ask("What port is being used", "21"),
        Question::ask("What credentials are being used", credentials),
        Question::ask("Are the credentials valid", format!("Yes, {}:{}", FTP_USER, valid)),
    ]
}

/// Kali connected to a hub: every frame reaches every port.
#[derive(Debug, Clone, Default)]
pub struct PacketSniffing;

impl PacketSniffing {
    pub const CONNECTION_WAIT: u32 = 5;
}

impl Scenario for PacketSniffing {
    type Network = SniffingNetwork;
    const NAME: &'static str = "Packet Sniffing";
    const WEIGHT: i32 = 30;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<SniffingNetwork> {
        let switch = SwitchConfig {
            fail_mode: FailMode::Standalone,
            ..Default::default()
        };
        build_sniffing_network(ctx, None, switch, &[])
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut SniffingNetwork) -> Result<Vec<HostCommand>> {
        let mut commands = add_ftp_traffic(ctx, net, Self::CONNECTION_WAIT)?;
        if let Some(switch) = net.plan.switch(net.switch) {
            // turn the switch into a hub
            commands.push(HostCommand::new(
                &switch.name,
                format!("ovs-ofctl add-flow {} action=flood", switch.name),
            ));
        }
        Ok(commands)
    }

    fn task(&self, net: &SniffingNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.extend(
            [
                "In this scenario your kali machine is connected to a hub, this means that all traffic is sent to every connected device.",
                "This task requires you to use Wireshark/tcpdump to sniff packets on the network.",
                "TIP: It may be useful to filter by protocol and ip when dumping packets.",
                "Answer the following questions:",
            ]
            .map(String::from),
        );
        task
    }

    fn questions(&self, net: &SniffingNetwork) -> Vec<Question> {
        sniffing_questions(net)
    }
}

/// Packet sniffing behind a learning switch; traffic has to be redirected first.
#[derive(Debug, Clone, Default)]
pub struct ArpPoisoning;

pub fn build_poisoning_network(
    ctx: &mut ScenarioContext<'_>,
    controller: ControllerConfig,
) -> Result<SniffingNetwork> {
    build_sniffing_network(ctx, Some(controller), SwitchConfig::default(), &POISONING_PACKAGES)
}

impl Scenario for ArpPoisoning {
    type Network = SniffingNetwork;
    const NAME: &'static str = "ARP Poisoning";
    const WEIGHT: i32 = 40;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<SniffingNetwork> {
        build_poisoning_network(ctx, ControllerConfig::Reference)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut SniffingNetwork) -> Result<Vec<HostCommand>> {
        add_ftp_traffic(ctx, net, PacketSniffing::CONNECTION_WAIT)
    }

    fn task(&self, net: &SniffingNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.extend(
            [
                "In this scenario your kali machine is connected to a switch capable of learning connected MAC addresses, \
                 this means that traffic will be delivered to the correct device once its location has been learned.",
                "This task requires you to use ettercap/arpspoof to trick devices into sending traffic to you instead of \
                 the intended recipient, then Wireshark/tcpdump can be used to analyse packets.",
                "Answer the following questions:",
            ]
            .map(String::from),
        );
        task
    }

    fn questions(&self, net: &SniffingNetwork) -> Vec<Question> {
        sniffing_questions(net)
    }
}

/// ARP poisoning made impossible by static ARP; the CAM table has to be flooded instead.
#[derive(Debug, Clone, Default)]
pub struct CamFlooding;

impl CamFlooding {
    pub const CONNECTION_WAIT: u32 = 1;
    pub const KALI_BANDWIDTH_MBPS: f64 = 0.25;
}

/// Throttle the link Kali is attached by, so a flood cannot take the switch down.
pub fn limit_host_link(plan: &mut TopologyPlan, host: HostId, mbps: f64) -> Result<()> {
    let link = plan
        .links_of(NodeRef::Host(host))
        .map(|(id, _)| id)
        .next()
        .ok_or_else(|| ScenarioError::TopologyShape(format!("host {} has no link", host.0)))?;
    if let Some(link) = plan.link_mut(link) {
        link.config = LinkConfig::limited(mbps);
    }
    Ok(())
}

/// Static ARP entries from every addressed host to every other one.
pub fn static_arp(plan: &TopologyPlan) -> Vec<HostCommand> {
    let hosts: Vec<_> = plan.hosts().iter().filter(|h| h.ip().is_some() && h.mac.is_some()).collect();
    let mut commands = Vec::new();
    for src in &hosts {
        for dest in &hosts {
            if src.name == dest.name {
                continue;
            }
            if let (Some(ip), Some(mac)) = (dest.ip(), dest.mac.as_deref()) {
                commands.push(HostCommand::new(
                    &src.name,
                    format!("arp -i {} -s {} {}", src.default_interface(), ip, mac),
                ));
            }
        }
    }
    commands
}

impl Scenario for CamFlooding {
    type Network = SniffingNetwork;
    const NAME: &'static str = "CAM Table flooding";
    const WEIGHT: i32 = 50;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<SniffingNetwork> {
        let controller = ControllerConfig::Pox {
            component: "cam_learning".to_string(),
        };
        let mut net = build_poisoning_network(ctx, controller)?;
        limit_host_link(&mut net.plan, net.kali, Self::KALI_BANDWIDTH_MBPS)?;
        Ok(net)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut SniffingNetwork) -> Result<Vec<HostCommand>> {
        let mut commands = add_ftp_traffic(ctx, net, Self::CONNECTION_WAIT)?;
        commands.extend(static_arp(&net.plan));
        Ok(commands)
    }

    fn task(&self, net: &SniffingNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.extend(
            [
                "In this scenario your kali machine is connected to a switch capable of learning connected MAC addresses, \
                 this means that traffic will be delivered to the correct device rather than all devices after seeing \
                 the device's MAC send a packet.",
                "MAC Addresses in this scenario are learned by storing them in a Content Addressable Memory (CAM) table, \
                 a dictionary of MACs to Ports.",
                "CAM tables such as this one are vulnerable to an attack known as flooding, where by filling the CAM table \
                 the switch is forced to relearn the MAC. Until the MAC address is relearned any packets sent to it are \
                 flooded on all of the switch's ports, and visible to devices connected to those ports.",
                "This task requires you to use 'macof' to perform CAM Table flooding, then Wireshark/tcpdump can be used \
                 to analyse packets.",
                "NOTE: The macof tool generates a large amount of traffic that slows the network to a crawl like a DOS \
                 attack. If you aren't successful in capturing traffic, pause your attack for a bit.",
                "Answer the following questions:",
            ]
            .map(String::from),
        );
        task
    }

    fn questions(&self, net: &SniffingNetwork) -> Vec<Question> {
        sniffing_questions(net)
    }
}
