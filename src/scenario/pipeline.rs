//! The ordered stages every scenario run goes through.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};

use super::{HostCommand, Lifecycle, Question, Scenario, Session, Stage};
use crate::error::{Result, ScenarioError};
use crate::output::{Documents, DocumentSink};
use crate::platform::EmulationPlatform;
use crate::topology::{HostKind, TopologyPlan};

/// Default bound on every platform call.
pub const DEFAULT_PLATFORM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub timeout: Duration,
    pub developer: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            timeout: DEFAULT_PLATFORM_TIMEOUT,
            developer: false,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub name: String,
    pub seed: String,
    pub plan: TopologyPlan,
    pub commands: Vec<HostCommand>,
    pub task: Vec<String>,
    pub questions: Vec<Question>,
    pub persisted: Vec<PathBuf>,
}

/// Run `scenario` for identifier `id` through every stage.
///
/// The topology is validated before anything reaches the platform, so a
/// failed allocation never leaves a half built network behind. Any
/// platform failure aborts the run.
pub fn run<S: Scenario>(
    scenario: &S,
    session: &mut Session,
    id: Option<&str>,
    platform: &mut dyn EmulationPlatform,
    sink: &mut dyn DocumentSink,
    settings: &RunSettings,
) -> Result<RunOutcome> {
    let mut lifecycle = Lifecycle::new();
    let mut ctx = session.context(S::NAME, id);
    ctx.set_developer(settings.developer);
    info!("Running {} for {}", S::NAME, ctx.seed());

    lifecycle.enter(Stage::ConstructTopology)?;
    let mut net = scenario.create_network(&mut ctx)?;

    lifecycle.enter(Stage::AssignAddresses)?;
    let plan = net.as_ref();
    plan.validate()?;
    for network in plan.networks() {
        info!("Network {}", network);
    }
    for (address, owner) in plan.addresses().assignments() {
        debug!("{} -> {}", address, owner);
    }

    lifecycle.enter(Stage::StartEmulation)?;
    start_emulation(net.as_mut(), platform, settings.timeout)?;

    lifecycle.enter(Stage::RunSetup)?;
    let mut commands = package_installs(net.as_ref());
    commands.extend(scenario.setup(&mut ctx, &mut net)?);
    for command in &commands {
        debug!("{}: {}", command.target, command.command);
        platform
            .run_command(&command.target, &command.command, settings.timeout)
            .map_err(|e| ScenarioError::platform(&command.target, "-", e))?;
    }

    lifecycle.enter(Stage::RenderQuestions)?;
    let task = scenario.task(&net);
    let questions = scenario.questions(&net);

    lifecycle.enter(Stage::Persist)?;
    let seed = ctx.seed().to_string();
    let plan = net.as_ref();
    let documents = Documents::new(S::NAME, &seed, &task, &questions, plan);
    let persisted = sink.persist(&documents)?;

    Ok(RunOutcome {
        name: S::NAME.to_string(),
        seed,
        plan: plan.clone(),
        commands,
        task,
        questions,
        persisted,
    })
}

/// Provision every node and link, then start switches and hosts.
///
/// VLAN attributes are pushed right after each switch starts.
pub fn start_emulation(plan: &mut TopologyPlan, platform: &mut dyn EmulationPlatform, timeout: Duration) -> Result<()> {
    for switch in plan.switches() {
        platform
            .add_switch(switch, plan.controller_for(switch), timeout)
            .map_err(|e| ScenarioError::platform(&switch.name, "-", e))?;
    }
    for host in plan.hosts() {
        platform
            .add_host(host, timeout)
            .map_err(|e| ScenarioError::platform(&host.name, host.default_interface(), e))?;
    }
    for link in plan.links() {
        platform
            .add_link(link, timeout)
            .map_err(|e| ScenarioError::platform(&link.left.node, &link.left.interface, e))?;
    }

    for switch in plan.switches_mut() {
        platform
            .start_switch(&switch.name, timeout)
            .map_err(|e| ScenarioError::platform(&switch.name, "-", e))?;
        let pushed = switch
            .vlans
            .apply_at_activation(&switch.name, platform.switch_control(), timeout)?;
        if pushed > 0 {
            debug!("Pushed {} VLAN settings to {}", pushed, switch.name);
        }
    }
    for host in plan.hosts() {
        platform
            .start_host(&host.name, timeout)
            .map_err(|e| ScenarioError::platform(&host.name, host.default_interface(), e))?;
    }
    Ok(())
}

/// Package installs for every Kali machine, run before scenario setup.
fn package_installs(plan: &TopologyPlan) -> Vec<HostCommand> {
    plan.hosts()
        .iter()
        .filter_map(|host| match &host.kind {
            HostKind::Kali(config) if !config.packages.is_empty() => Some(HostCommand::new(
                &host.name,
                format!("apt install -y {}", config.packages.join(" ")),
            )),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MemorySink;
    use crate::platform::{PlatformEvent, RecordingPlatform};
    use crate::scenario::sniffing::PacketSniffing;
    use crate::scenario::vlan::VlanTrunking;

    #[test]
    fn test_vlan_settings_follow_switch_start() {
        let mut session = Session::new();
        let mut platform = RecordingPlatform::new();
        let mut sink = MemorySink::new();
        let outcome = run(
            &VlanTrunking::default(),
            &mut session,
            Some("1001"),
            &mut platform,
            &mut sink,
            &RunSettings::default(),
        )
        .unwrap();

        let events = platform.events();
        for switch in outcome.plan.switches() {
            let started = events
                .iter()
                .position(|e| matches!(e, PlatformEvent::StartSwitch { name } if *name == switch.name))
                .unwrap();
            let first_push = events
                .iter()
                .position(|e| matches!(e, PlatformEvent::SetPort { switch: s, .. } if *s == switch.name))
                .unwrap();
            assert!(first_push > started);
            assert!(switch.vlans.is_applied());
        }
        let adds = events.iter().filter(|e| matches!(e, PlatformEvent::AddLink { .. })).count();
        assert_eq!(adds, outcome.plan.links().len());
        assert_eq!(sink.documents().len(), 1);
    }

    #[test]
    fn test_setup_commands_reach_platform() {
        let mut session = Session::new();
        let mut platform = RecordingPlatform::new();
        let mut sink = MemorySink::new();
        let outcome = run(
            &PacketSniffing,
            &mut session,
            Some("2001"),
            &mut platform,
            &mut sink,
            &RunSettings::default(),
        )
        .unwrap();

        assert_eq!(outcome.commands[0].target, "kali");
        assert!(outcome.commands[0].command.starts_with("apt install -y wireshark tcpdump ftp"));
        let sent = platform
            .events()
            .iter()
            .filter(|e| matches!(e, PlatformEvent::Command { .. }))
            .count();
        assert_eq!(sent, outcome.commands.len());
        assert_eq!(outcome.questions.len(), 5);
    }

    #[test]
    fn test_platform_failure_aborts_with_location() {
        let mut session = Session::new();
        let mut platform = RecordingPlatform::new();
        platform.make_unavailable("s1");
        let mut sink = MemorySink::new();
        let err = run(
            &VlanTrunking::default(),
            &mut session,
            Some("1001"),
            &mut platform,
            &mut sink,
            &RunSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::PlatformUnavailable { ref switch, .. } if switch == "s1"));
        assert!(sink.documents().is_empty());
    }
}
