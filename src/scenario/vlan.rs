//! VLAN segmentation exercises.

use ipnet::Ipv4Net;
use rand::seq::SliceRandom;
use rand::Rng;

use super::sniffing::static_arp;
use super::{
    base_task, HostCommand, Question, Scenario, ScenarioContext, ScenarioOptions, VlanRange, SCANNABLE_VLANS,
};
use crate::error::{Result, ScenarioError};
use crate::ip::HostAddressPool;
use crate::topology::{
    self, HostId, HostKind, KaliConfig, LinkConfig, LinkId, NodeRef, Shape, SwitchConfig, SwitchId, TopologyPlan,
};
use crate::vlan::{ensure_distinct, VlanId, VlanIdPool, VlanMode};

const DEFAULT_PREFIX_LEN: u8 = 26;
const DEFAULT_VLAN_COUNT: usize = 3;

/// Switches joined by trunks, with hosts spread over random switches and VLANs.
///
/// `vlans[0]` is the native VLAN of every trunk and of Kali's port.
#[derive(Debug, Clone)]
pub struct VlanNetwork {
    pub plan: TopologyPlan,
    pub subnet: Ipv4Net,
    pub vlans: Vec<VlanId>,
    pub vlan_range: VlanRange,
    pub switches: Vec<SwitchId>,
    pub kali: HostId,
    pub kali_link: LinkId,
    pub hosts: Vec<HostId>,
    /// Addresses not yet handed out, in draw order
    pub pool: HostAddressPool,
}

impl AsRef<TopologyPlan> for VlanNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.plan
    }
}

impl AsMut<TopologyPlan> for VlanNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.plan
    }
}

impl VlanNetwork {
    /// Native VLAN of the trunks.
    pub fn native_vlan(&self) -> VlanId {
        self.vlans[0]
    }

    fn kali_ip(&self) -> String {
        self.plan
            .host(self.kali)
            .and_then(|k| k.ip())
            .map(|ip| ip.to_string())
            .unwrap_or_default()
    }

    fn kali_interface(&self) -> String {
        self.plan
            .host(self.kali)
            .map(|k| k.default_interface())
            .unwrap_or_default()
    }

    /// Record VLAN attributes for `switch`'s end of `link`.
    pub fn configure_port(
        &mut self,
        link: LinkId,
        switch: SwitchId,
        tag: Option<VlanId>,
        trunks: &[VlanId],
        mode: Option<VlanMode>,
    ) -> Result<()> {
        let (model, port) = self.plan.switch_port(link, switch)?;
        if let Some(tag) = tag {
            model.add_tag(&port, tag);
        }
        if !trunks.is_empty() {
            model.add_trunk(&port, trunks);
        }
        if let Some(mode) = mode {
            model.add_mode(&port, mode);
        }
        Ok(())
    }
}

/// Distinct VLAN ids for the network, either listed in the options or drawn.
fn draw_vlans(ctx: &mut ScenarioContext<'_>, options: &ScenarioOptions) -> Result<Vec<VlanId>> {
    if let Some(vlans) = &options.vlans {
        ensure_distinct(vlans)?;
        return Ok(vlans.clone());
    }
    let count = options.vlan_count.unwrap_or(DEFAULT_VLAN_COUNT);
    match options.vlan_range {
        VlanRange::Scannable => VlanIdPool::with_range(SCANNABLE_VLANS)?.next_distinct(ctx.rng(), count),
        VlanRange::Full => ctx.next_distinct_vlans(count),
    }
}

pub fn build_vlan_network(ctx: &mut ScenarioContext<'_>, options: &ScenarioOptions) -> Result<VlanNetwork> {
    let switch_count = match options.switch_count {
        Some(count) => count,
        None => ctx.rng().gen_range(3..8u32) as usize,
    };
    let host_count = match options.host_count {
        Some(count) => count,
        None => ctx.rng().gen_range(10..30u32) as usize,
    };
    let vlans = draw_vlans(ctx, options)?;
    if vlans.is_empty() {
        return Err(ScenarioError::TopologyShape("a VLAN network needs at least one VLAN".to_string()));
    }
    let prefix_len = options.prefix_len.unwrap_or(DEFAULT_PREFIX_LEN);
    let subnet = ctx.allocate(prefix_len)?;
    let pool = ctx.shuffled_host_pool(subnet);

    let mut plan = TopologyPlan::new(None);
    plan.record_network(subnet);
    let shape = options.shape.unwrap_or(Shape::Path);
    let (switches, trunk_links) = topology::build(&mut plan, switch_count, &shape, |_| SwitchConfig::default())?;
    if switches.is_empty() {
        return Err(ScenarioError::TopologyShape("a VLAN network needs at least one switch".to_string()));
    }

    let mut net = VlanNetwork {
        plan,
        subnet,
        vlans,
        vlan_range: options.vlan_range,
        switches,
        kali: HostId(0),
        kali_link: LinkId(0),
        hosts: Vec::new(),
        pool,
    };
    let native = net.native_vlan();
    let all = net.vlans.clone();

    for link in trunk_links {
        let ends = net
            .plan
            .link(link)
            .map(|l| l.nodes())
            .ok_or_else(|| ScenarioError::TopologyShape(format!("missing link {}", link.0)))?;
        for end in [ends.0, ends.1] {
            if let NodeRef::Switch(switch) = end {
                net.configure_port(link, switch, Some(native), &all, Some(VlanMode::NativeUntagged))?;
            }
        }
    }

    let ip = net.pool.pop()?;
    net.kali = net
        .plan
        .add_host("kali", HostKind::Kali(KaliConfig::default()), Some(net.pool.interface(ip)?))?;
    net.kali_link = net.plan.add_link(net.switches[0], net.kali, LinkConfig::default())?;
    net.configure_port(net.kali_link, net.switches[0], Some(native), &[], Some(VlanMode::NativeUntagged))?;

    let mut hosts = Vec::with_capacity(host_count);
    for i in 0..host_count {
        let ip = net.pool.pop()?;
        hosts.push(net.plan.add_host(format!("h{}", i), HostKind::Host, Some(net.pool.interface(ip)?))?);
    }
    for host in &hosts {
        let switch = *net.switches.choose(ctx.rng()).unwrap_or(&net.switches[0]);
        let vlan = *net.vlans.choose(ctx.rng()).unwrap_or(&native);
        let link = net.plan.add_link(switch, *host, LinkConfig::default())?;
        net.configure_port(link, switch, Some(vlan), &[], Some(VlanMode::Access))?;
        if let Some(node) = net.plan.host_mut(*host) {
            node.vlan = Some(vlan);
        }
    }
    net.hosts = hosts;
    Ok(net)
}

fn range_hint(range: VlanRange) -> &'static str {
    match range {
        VlanRange::Scannable => "The VLANs are somewhere in the range 1-10.",
        VlanRange::Full => "The VLANs are somewhere in the range 1-4094.",
    }
}

#[derive(Debug, Clone, Default)]
pub struct VlanTrunking {
    pub options: ScenarioOptions,
}

impl Scenario for VlanTrunking {
    type Network = VlanNetwork;
    const NAME: &'static str = "VLAN Scanning";
    const WEIGHT: i32 = 60;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<VlanNetwork> {
        build_vlan_network(ctx, &self.options)
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut VlanNetwork) -> Result<Vec<HostCommand>> {
        if !ctx.is_developer() {
            return Ok(Vec::new());
        }
        let intf = net.kali_interface();
        let target = format!("{}/{}", net.kali_ip(), net.subnet.prefix_len());
        let mut commands = vec![HostCommand::new("kali", format!("arp-scan -I {} {}", intf, target))];
        for vlan in &net.vlans {
            commands.push(HostCommand::new("kali", format!("arp-scan -I {} -Q {} {}", intf, vlan, target)));
        }
        Ok(commands)
    }

    fn task(&self, net: &VlanNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.plan);
        task.push(format!(
            "In this scenario your kali machine is part of a network segmented through VLANs. However, your Kali \
             machine is connected to a trunk port capable of carrying all VLANs, meaning you can communicate with any \
             VLAN by adding a VLAN tag to your packets. {}",
            range_hint(net.vlan_range)
        ));
        task.push("The tool arp-scan is able to find devices outside of your VLAN by specifying a VLAN to scan.".to_string());
        task.push("Answer the following questions:".to_string());
        task
    }

    fn questions(&self, net: &VlanNetwork) -> Vec<Question> {
        let active: Vec<String> = net.vlans.iter().map(|v| v.to_string()).collect();
        let placement: String = net
            .hosts
            .iter()
            .filter_map(|id| net.plan.host(*id))
            .filter_map(|h| Some(format!("\n{} tag {}", h.ip()?, h.vlan?)))
            .collect();
        vec![
            Question::ask("What VLANs are active in the network", active.join(" ")),
            Question::ask(
                "What VLAN is the Kali machine connected to. (Hint: scan without a VLAN tag)",
                net.native_vlan().to_string(),
            ),
            Question::ask("What IP addresses are active on which VLANs", placement),
        ]
    }
}

/// VLAN scanning plus a second Kali machine reachable only by double tagging.
#[derive(Debug, Clone)]
pub struct DoubleTaggingNetwork {
    pub base: VlanNetwork,
    pub kali_receive: HostId,
    /// Access ports strip the inner tag before delivery; native-tagged ports keep it
    pub receive_mode: VlanMode,
}

impl AsRef<TopologyPlan> for DoubleTaggingNetwork {
    fn as_ref(&self) -> &TopologyPlan {
        &self.base.plan
    }
}

impl AsMut<TopologyPlan> for DoubleTaggingNetwork {
    fn as_mut(&mut self) -> &mut TopologyPlan {
        &mut self.base.plan
    }
}

#[derive(Debug, Clone, Default)]
pub struct VlanDoubleTagging {
    pub options: ScenarioOptions,
}

impl Scenario for VlanDoubleTagging {
    type Network = DoubleTaggingNetwork;
    const NAME: &'static str = "VLAN Double Tagging";
    const WEIGHT: i32 = 70;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<DoubleTaggingNetwork> {
        let mut base = build_vlan_network(ctx, &self.options)?;
        if base.vlans.len() < 2 || base.switches.len() < 2 {
            return Err(ScenarioError::TopologyShape(
                "double tagging needs at least two VLANs and two switches".to_string(),
            ));
        }
        let (first, second) = (base.vlans[0], base.vlans[1]);

        // Kali's port only accepts frames already tagged with the native VLAN
        base.configure_port(base.kali_link, base.switches[0], None, &[first], None)?;

        let default = KaliConfig::default();
        let config = KaliConfig {
            vnc_port: default.vnc_port + 1,
            web_port: default.web_port + 1,
            ..default
        };
        let ip = base.pool.pop()?;
        let kali_receive = base
            .plan
            .add_host("kali2", HostKind::Kali(config), Some(base.pool.interface(ip)?))?;
        let link = base.plan.add_link(base.switches[1], kali_receive, LinkConfig::default())?;
        let receive_mode = *[VlanMode::Access, VlanMode::NativeTagged]
            .choose(ctx.rng())
            .unwrap_or(&VlanMode::Access);
        base.configure_port(link, base.switches[1], Some(second), &[], Some(receive_mode))?;
        if let Some(node) = base.plan.host_mut(kali_receive) {
            node.vlan = Some(second);
        }

        Ok(DoubleTaggingNetwork {
            base,
            kali_receive,
            receive_mode,
        })
    }

    fn setup(&self, ctx: &mut ScenarioContext<'_>, net: &mut DoubleTaggingNetwork) -> Result<Vec<HostCommand>> {
        let base = &net.base;
        let mut commands = static_arp(&base.plan);
        if ctx.is_developer() {
            let intf = base.kali_interface();
            let native = base.native_vlan();
            let native_intf = format!("{}.{}", intf, native);
            commands.push(HostCommand::new("kali", format!("vconfig add {} {}", intf, native)));
            commands.push(HostCommand::new("kali", format!("ip l set up dev {}", native_intf)));
            for vlan in &base.vlans {
                let double = format!("{}.{}", native_intf, vlan);
                commands.push(HostCommand::new("kali", format!("vconfig add {} {}", native_intf, vlan)));
                commands.push(HostCommand::new("kali", format!("ip l set up dev {}", double)));
                commands.push(HostCommand::new(
                    "kali",
                    format!("arp-scan -I {} {}/{}", double, base.kali_ip(), base.subnet.prefix_len()),
                ));
            }
        }
        Ok(commands)
    }

    fn task(&self, net: &DoubleTaggingNetwork) -> Vec<String> {
        let mut task = base_task(Self::NAME, &net.base.plan);
        task.push(format!(
            "In this scenario you have access to two Kali machines in separate VLANs in the same network. {}",
            range_hint(net.base.vlan_range)
        ));
        task.push("The tool arp-scan is able to find which VLAN you are a part of by specifying a VLAN to scan.".to_string());
        task.push("The vconfig tool can be used to add a VLAN tag to an interface.".to_string());
        task.push("Answer the following questions:".to_string());
        task
    }

    fn questions(&self, net: &DoubleTaggingNetwork) -> Vec<Question> {
        let base = &net.base;
        let (first, second) = (base.vlans[0], base.vlans[1]);
        let intf = base.kali_interface();
        let access = net.receive_mode == VlanMode::Access;
        vec![
            Question::ask("What VLAN is the first Kali machine connected to", first.to_string()),
            Question::ask("What VLAN is the second Kali machine connected to", second.to_string()),
            Question::ask(
                "Use vconfig on the first Kali machine to add a VLAN tag to its task interface. What is the new interface's name",
                format!("{}.{}", intf, first),
            ),
            Question::ask(
                "Repeat this process to add a VLAN tag to the new interface, this time adding the second Kali machine's VLAN. \
                 What is the new interface's name",
                format!("{}.{}.{}", intf, first, second),
            ),
            Question::ask(
                "Use this interface to arp-scan for devices, are any devices found",
                "No, as VLAN tagging is unidirectional",
            ),
            Question::ask("Open wireshark on the second Kali and run the scan again, was any traffic received", "Yes"),
            Question::ask(
                "If so, what VLAN, if any, does it belong to",
                if access { "None".to_string() } else { second.to_string() },
            ),
            Question::ask("Was any traffic sent", if access { "Yes" } else { "No" }),
            Question::ask(
                "If so, what VLAN, if any, does it belong to",
                if access { "None" } else { "N/A" },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Session;

    fn vlan_network(id: &str, options: ScenarioOptions) -> VlanNetwork {
        let mut session = Session::new();
        let mut ctx = session.context(VlanTrunking::NAME, Some(id));
        VlanTrunking { options }.create_network(&mut ctx).unwrap()
    }

    #[test]
    fn test_vlan_network_layout() {
        let net = vlan_network("1001", ScenarioOptions::default());
        assert!((3..=7).contains(&net.switches.len()));
        assert!((10..=29).contains(&net.hosts.len()));
        assert_eq!(net.vlans.len(), 3);
        assert!(net.vlans.iter().all(|v| (1..=9).contains(&v.get())));
        assert_eq!(net.subnet.prefix_len(), 26);
        // path of switches plus one link per host and one for Kali
        assert_eq!(net.plan.links().len(), net.switches.len() - 1 + net.hosts.len() + 1);
        net.plan.validate().unwrap();
    }

    #[test]
    fn test_trunk_ports_carry_every_vlan() {
        let net = vlan_network("1002", ScenarioOptions::default());
        let s0 = net.plan.switch(net.switches[0]).unwrap();
        let trunk = s0.vlans.port("s0-eth1").unwrap();
        assert_eq!(trunk.tag, Some(net.vlans[0]));
        assert_eq!(trunk.trunks.len(), 3);
        assert_eq!(trunk.effective_mode(), VlanMode::NativeUntagged);

        let kali_port = s0.vlans.port("s0-eth2").unwrap();
        assert_eq!(kali_port.tag, Some(net.vlans[0]));
        assert!(kali_port.trunks.is_empty());
    }

    #[test]
    fn test_hosts_on_access_ports() {
        let net = vlan_network("1003", ScenarioOptions::default());
        for id in &net.hosts {
            let (_, link) = net.plan.links_of(NodeRef::Host(*id)).next().unwrap();
            let host = net.plan.host(*id).unwrap();
            let switch = net.plan.switches().iter().find(|s| s.name == link.left.node).unwrap();
            let port = switch.vlans.port(&link.left.interface).unwrap();
            assert_eq!(port.mode, Some(VlanMode::Access));
            assert_eq!(port.tag, host.vlan);
            assert!(net.vlans.contains(&host.vlan.unwrap()));
        }
    }

    #[test]
    fn test_full_range_uses_session_pool() {
        let mut session = Session::new();
        let options = ScenarioOptions {
            vlan_range: VlanRange::Full,
            vlan_count: Some(4),
            ..Default::default()
        };
        let mut ctx = session.context(VlanTrunking::NAME, Some("wide"));
        let net = VlanTrunking { options }.create_network(&mut ctx).unwrap();
        assert_eq!(net.vlans.len(), 4);
        assert_eq!(session.vlans().remaining(), 4093 - 4);
    }

    #[test]
    fn test_scannable_vlan_count_is_capped() {
        let mut session = Session::new();
        let options = ScenarioOptions {
            vlan_count: Some(12),
            ..Default::default()
        };
        let mut ctx = session.context(VlanTrunking::NAME, Some("42"));
        assert!(matches!(
            VlanTrunking { options }.create_network(&mut ctx),
            Err(ScenarioError::VlanPoolExhausted { requested: 12, capacity: 9 })
        ));
    }

    #[test]
    fn test_scannable_range_can_be_used_up() {
        let options = ScenarioOptions {
            vlan_count: Some(9),
            ..Default::default()
        };
        let net = vlan_network("42", options);
        let mut ids: Vec<u16> = net.vlans.iter().map(|v| v.get()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=9).collect::<Vec<u16>>());
    }

    #[test]
    fn test_listed_vlans_must_be_distinct() {
        let ids = [3, 5, 3].map(|id| VlanId::new(id).unwrap());
        let options = ScenarioOptions {
            vlans: Some(ids.to_vec()),
            ..Default::default()
        };
        let mut session = Session::new();
        let mut ctx = session.context(VlanTrunking::NAME, Some("42"));
        assert!(matches!(
            VlanTrunking { options }.create_network(&mut ctx),
            Err(ScenarioError::DuplicateVlanId(id)) if id == 3
        ));
    }

    #[test]
    fn test_double_tagging() {
        let mut session = Session::new();
        let scenario = VlanDoubleTagging::default();
        let mut ctx = session.context(VlanDoubleTagging::NAME, Some("1004"));
        let mut net = scenario.create_network(&mut ctx).unwrap();

        let base = &net.base;
        let s0 = base.plan.switch(base.switches[0]).unwrap();
        let kali_port = s0.vlans.port("s0-eth2").unwrap();
        assert!(kali_port.trunks.contains(&base.vlans[0]));

        let kali2 = base.plan.host(net.kali_receive).unwrap();
        let HostKind::Kali(config) = &kali2.kind else {
            panic!("kali2 has the wrong kind");
        };
        assert_eq!((config.vnc_port, config.web_port), (5901, 6081));
        assert!(matches!(net.receive_mode, VlanMode::Access | VlanMode::NativeTagged));

        let commands = scenario.setup(&mut ctx, &mut net).unwrap();
        assert!(commands.iter().all(|c| c.command.starts_with("arp -i ")));
        assert_eq!(scenario.questions(&net).len(), 9);
    }

    #[test]
    fn test_double_tagging_needs_two_vlans() {
        let mut session = Session::new();
        let options = ScenarioOptions {
            vlan_count: Some(1),
            ..Default::default()
        };
        let mut ctx = session.context(VlanDoubleTagging::NAME, Some("x"));
        assert!(matches!(
            VlanDoubleTagging { options }.create_network(&mut ctx),
            Err(ScenarioError::TopologyShape(_))
        ));
    }
}
