//! Host and port scanning exercises.

use ipnet::Ipv4Net;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{base_task, sorted_ips, HostCommand, Question, Scenario, ScenarioContext, ScenarioOptions};
use crate::error::Result;
use crate::topology::{
    ControllerConfig, HostId, HostKind, KaliConfig, LinkConfig, SwitchConfig, SwitchId, TopologyPlan,
};

/// nmap's top 100 TCP ports.
pub const TOP_100_PORTS: [u16; 100] = [
    7, 9, 13, 21, 22, 23, 25, 26, 37, 53, 79, 80, 81, 88, 106, 110, 111, 113, 119, 135, 139, 143, 144, 179, 199, 389,
    427, 443, 444, 445, 465, 513, 514, 515, 543, 544, 548, 554, 587, 631, 646, 873, 990, 993, 995, 1025, 1026, 1027,
    1028, 1029, 1110, 1433, 1720, 1723, 1755, 1900, 2000, 2001, 2049, 2121, 2717, 3000, 3128, 3306, 3389, 3986, 4899,
    5000, 5009, 5051, 5060, 5101, 5190, 5357, 5432, 5631, 5666, 5800, 5900, 6000, 6001, 6646, 7070, 8000, 8008, 8009,
    8080, 8081, 8443, 8888, 9100, 9999, 10000, 32768, 49152, 49153, 49154, 49155, 49156, 49157,
];

/// One switch with a Kali machine and a crowd of plain hosts on one subnet.
#[derive(Debug, Clone)]
pub struct ScanningNetwork {
    pub plan: TopologyPlan,
    pub subnet: Ipv4Net,
    pub switch: SwitchId,
    pub kali: HostId,
    pub hosts: Vec<HostId>,
}

impl AsRef<TopologyPlan> for ScanningNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.plan
    }
}

impl AsMut<TopologyPlan> for ScanningNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.plan
    }
}

/// Kali takes the highest address; hosts take random ones until the count or the subnet runs out.
pub fn build_scanning_network(ctx: &mut ScenarioContext<'_>, options: &ScenarioOptions) -> Result<ScanningNetwork> {
    let mut plan = TopologyPlan::new(Some(ControllerConfig::Reference));
    let switch = plan.add_switch("s1", SwitchConfig::default())?;

    let prefix_len = match options.prefix_len {
        Some(prefix_len) => prefix_len,
        None => ctx.rng().gen_range(24..=27u8),
    };
    let subnet = ctx.allocate(prefix_len)?;
    plan.record_network(subnet);
    let mut pool = ctx.host_pool(subnet);

    let kali_ip = pool.pop()?;
    let kali = plan.add_host("kali", HostKind::Kali(KaliConfig::default()), Some(pool.interface(kali_ip)?))?;
    plan.add_link(switch, kali, LinkConfig::default())?;

    let host_count = match options.host_count {
        Some(count) => count,
        None => ctx.rng().gen_range(10..=25u32) as usize,
    };
    let mut hosts = Vec::with_capacity(host_count);
    for i in 0..host_count {
        if pool.is_empty() {
            break;
        }
        let ip = pool.take_random(ctx.rng())?;
        let host = plan.add_host(format!("h{}", i), HostKind::Host, Some(pool.interface(ip)?))?;
        plan.add_link(switch, host, LinkConfig::default())?;
        hosts.push(host);
    }

    Ok(ScanningNetwork {
        plan,
        subnet,
        switch,
        kali,
        hosts,
    })
}

fn kali_self_check(net: &ScanningNetwork) -> Vec<HostCommand> {
    let mut commands = vec![HostCommand::new("kali", "ip a")];
    if let Some(ip) = net.plan.host(net.kali).and_then(|k| k.ip()) {
        commands.push(HostCommand::new(
            "kali",
            format!("nmap -v {}/{}", ip, net.subnet.prefix_len()),
        ));
    }
    commands
}

fn scanning_questions(net: &ScanningNetwork) -> Vec<Question> {
    let subnet = net.subnet;
    let kali_ip = net
        .plan
        .host(net.kali)
        .and_then(|k| k.ip())
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    let first = subnet.hosts().next().map(|ip| ip.to_string()).unwrap_or_default();
    let last = subnet.hosts().last().map(|ip| ip.to_string()).unwrap_or_default();
    let up = sorted_ips(net.hosts.iter().filter_map(|id| net.plan.host(*id)));

    vec![
        Question::ask("What IP address is assigned to the Kali machine", kali_ip),
        Question::ask("What is the Network Address of this network", subnet.network().to_string()),
        Question::ask("What is the Broadcast Address of this network", subnet.broadcast().to_string()),
        Question::ask(
            "What Range of IP addresses is usable in this subnet",
            format!("{} - {}", first, last),
        ),
        Question::ask(
            "What IP addresses are found to have hosts up",
            up.iter().map(|ip| format!("\n{}", ip)).collect::<String>(),
        ),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct HostScanning {
    pub options: ScenarioOptions,
}

impl Scenario for HostScanning {
    type Network = ScanningNetwork;
    const NAME: &'static str = "Host Scanning";
    const WEIGHT: i32 = 10;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<ScanningNetwork> {
        build_scanning_network(ctx, &self.options)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut ScanningNetwork) -> Result<Vec<HostCommand>> {
        Ok(if ctx.is_developer() { kali_self_check(net) } else { Vec::new() })
    }

    fn task(&self, net: &ScanningNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.push(
            "This task requires you to use ip/ifconfig and nmap to gather information about the connected network. \
             Answer the following questions:"
                .to_string(),
        );
        task
    }

    fn questions(&self, net: &ScanningNetwork) -> Vec<Question> {
        scanning_questions(net)
    }
}

/// Host scanning where every host also listens on a few well known ports.
#[derive(Debug, Clone, Default)]
pub struct PortScanning {
    pub options: ScenarioOptions,
}

impl Scenario for PortScanning {
    type Network = ScanningNetwork;
    const NAME: &'static str = "Port Scanning";
    const WEIGHT: i32 = 20;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<ScanningNetwork> {
        build_scanning_network(ctx, &self.options)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut ScanningNetwork) -> Result<Vec<HostCommand>> {
        let mut commands = Vec::new();
        for id in &net.hosts {
            let count = ctx.rng().gen_range(0..=4u32);
            let mut ports = Vec::new();
            for _ in 0..count {
                if let Some(&port) = TOP_100_PORTS.choose(ctx.rng()) {
                    if !ports.contains(&port) {
                        ports.push(port);
                    }
                }
            }
            if let Some(host) = net.plan.host_mut(*id) {
                for port in &ports {
                    commands.push(HostCommand::new(&host.name, format!("nc -l -d -p {} &", port)));
                }
                host.open_ports = ports;
            }
        }
        if ctx.is_developer() {
            commands.extend(kali_self_check(net));
        }
        Ok(commands)
    }

    fn task(&self, net: &ScanningNetwork) -> Vec<String> {
        HostScanning::default().task(net)
    }

    fn questions(&self, net: &ScanningNetwork) -> Vec<Question> {
        let mut questions = scanning_questions(net);
        let mut hosts: Vec<_> = net.hosts.iter().filter_map(|id| net.plan.host(*id)).collect();
        hosts.sort_by_key(|h| h.ip());
        let answer: String = hosts
            .iter()
            .filter_map(|h| {
                let ports: Vec<String> = h.open_ports.iter().map(|p| p.to_string()).collect();
                h.ip().map(|ip| format!("\n{}:\t{}", ip, ports.join("\t")))
            })
            .collect();
        questions.push(Question::ask("What Port & IP combinations are open on the network", answer));
        questions
    }
}
