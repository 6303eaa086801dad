//! Spanning tree exercise: a switching loop kept alive by RSTP.

use ipnet::Ipv4Net;

use super::{base_task, sorted_ips, HostCommand, Question, Scenario, ScenarioContext, ScenarioOptions};
use crate::error::Result;
use crate::topology::{
    self, ControllerConfig, HostId, HostKind, KaliConfig, LinkConfig, LinkId, Shape, SwitchConfig, SwitchId,
    TopologyPlan,
};

const DEFAULT_SWITCH_COUNT: usize = 3;
const DEFAULT_PREFIX_LEN: u8 = 24;

#[derive(Debug, Clone)]
pub struct LoopNetwork {
    pub plan: TopologyPlan,
    pub subnet: Ipv4Net,
    pub switches: Vec<SwitchId>,
    pub switch_links: Vec<LinkId>,
    pub kali: HostId,
    pub hosts: Vec<HostId>,
}

impl AsRef<TopologyPlan> for LoopNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.plan
    }
}

impl AsMut<TopologyPlan> for LoopNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.plan
    }
}

impl LoopNetwork {
    /// Inter-switch links spanning tree has to block.
    pub fn redundant_links(&self) -> usize {
        (self.switch_links.len() + 1).saturating_sub(self.switches.len())
    }
}

/// RSTP switches in a ring, one host on each, Kali on the first.
pub fn build_loop_network(ctx: &mut ScenarioContext<'_>, options: &ScenarioOptions) -> Result<LoopNetwork> {
    let subnet = ctx.allocate(options.prefix_len.unwrap_or(DEFAULT_PREFIX_LEN))?;
    let mut pool = ctx.host_pool(subnet);

    let mut plan = TopologyPlan::new(Some(ControllerConfig::Reference));
    plan.record_network(subnet);
    let count = options.switch_count.unwrap_or(DEFAULT_SWITCH_COUNT);
    let shape = options.shape.unwrap_or(Shape::Cycle);
    let (switches, switch_links) = topology::build(&mut plan, count, &shape, |_| SwitchConfig::rstp())?;

    let mut hosts = Vec::with_capacity(switches.len());
    for (i, switch) in switches.iter().enumerate() {
        let ip = pool.take_first()?;
        let host = plan.add_host(format!("h{}", i), HostKind::Host, Some(pool.interface(ip)?))?;
        plan.add_link(host, *switch, LinkConfig::default())?;
        hosts.push(host);
    }

    let ip = pool.pop()?;
    let kali = plan.add_host("kali", HostKind::Kali(KaliConfig::default()), Some(pool.interface(ip)?))?;
    if let Some(first) = switches.first() {
        plan.add_link(*first, kali, LinkConfig::default())?;
    }

    Ok(LoopNetwork {
        plan,
        subnet,
        switches,
        switch_links,
        kali,
        hosts,
    })
}

#[derive(Debug, Clone, Default)]
pub struct SpanningTree {
    pub options: ScenarioOptions,
}

impl Scenario for SpanningTree {
    type Network = LoopNetwork;
    const NAME: &'static str = "Spanning Tree";
    const WEIGHT: i32 = 80;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<LoopNetwork> {
        build_loop_network(ctx, &self.options)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut LoopNetwork) -> Result<Vec<HostCommand>> {
        if !ctx.is_developer() {
            return Ok(Vec::new());
        }
        Ok(net
            .plan
            .switches()
            .iter()
            .map(|s| HostCommand::new(&s.name, format!("ovs-vsctl get bridge {} rstp_status", s.name)))
            .collect())
    }

    fn task(&self, net: &LoopNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.push(
            "In this scenario the switches are connected in a loop. Without a loop prevention protocol a single \
             broadcast would circle the network forever."
                .to_string(),
        );
        task.push(
            "Use Wireshark/tcpdump on the Kali machine to watch the bridge protocol frames the switches exchange. \
             Answer the following questions:"
                .to_string(),
        );
        task
    }

    fn questions(&self, net: &LoopNetwork) -> Vec<Question> {
        let reachable = sorted_ips(net.hosts.iter().filter_map(|id| net.plan.host(*id)));
        vec![
            Question::ask("How many switches form the loop", net.switches.len().to_string()),
            Question::ask(
                "What protocol are the switches using to prevent the loop",
                "Rapid Spanning Tree Protocol (RSTP)",
            ),
            Question::ask(
                "How many inter-switch links are blocked once the protocol converges",
                net.redundant_links().to_string(),
            ),
            Question::ask(
                "What IP addresses can be reached from the Kali machine",
                reachable.iter().map(|ip| format!("\n{}", ip)).collect::<String>(),
            ),
        ]
    }
}
