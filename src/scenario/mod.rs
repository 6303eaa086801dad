//! Scenario seeding and composition.
//!
//! A scenario run is identified by the scenario name plus a caller supplied
//! identifier (usually a student id). The two are hashed into the seed of
//! the run's random source, so the same pair always rebuilds the same
//! topology. Every random choice of the run must come from
//! [`ScenarioContext::rng`] in a fixed order; adding or reordering draws
//! changes everything downstream.
//!
//! Variants are built by composition: each one calls the builder function
//! of the variant it extends and wraps the network value it returns.

use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

use ipnet::Ipv4Net;
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScenarioError};
use crate::ip::{AllocationPool, HostAddressPool};
use crate::topology::{HostKind, HostNode, Shape, TopologyPlan};
use crate::vlan::{VlanId, VlanIdPool, POOL_RANGE};

pub mod dhcp;
pub mod pipeline;
pub mod registry;
pub mod scanning;
pub mod sniffing;
pub mod stp;
pub mod vlan;

pub use pipeline::{run, RunOutcome, RunSettings, DEFAULT_PLATFORM_TIMEOUT};
pub use registry::ScenarioKind;

/// VLAN ids small enough for students to find by hand.
pub const SCANNABLE_VLANS: RangeInclusive<u16> = 1..=9;

/// Subnet sizes a scenario may ask for; wider ones cannot be enumerated host by host.
pub const PREFIX_LEN_RANGE: RangeInclusive<u8> = 16..=30;

/// Identifier used when the caller supplies none; such runs are not reproducible.
pub const RANDOM_SEED: &str = "random";

/// Seed bytes for the run of scenario `name` for identifier `id`.
pub fn derive_seed(name: &str, id: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(id.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Random source for one run. `None` draws from OS entropy.
pub fn seeded_rng(name: &str, id: Option<&str>) -> ChaCha8Rng {
    match id {
        Some(id) => ChaCha8Rng::from_seed(derive_seed(name, id)),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Steps every scenario run goes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConstructTopology,
    AssignAddresses,
    StartEmulation,
    RunSetup,
    RenderQuestions,
    Persist,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ConstructTopology,
        Stage::AssignAddresses,
        Stage::StartEmulation,
        Stage::RunSetup,
        Stage::RenderQuestions,
        Stage::Persist,
    ];

    fn next(self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| *s == self)?;
        Stage::ALL.get(idx + 1).copied()
    }
}

/// Tracks a run's progress through [`Stage::ALL`]; stages cannot be skipped or repeated.
#[derive(Debug, Default)]
pub struct Lifecycle {
    last: Option<Stage>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, stage: Stage) -> Result<()> {
        let expected = match self.last {
            None => Some(Stage::ConstructTopology),
            Some(last) => last.next(),
        };
        if expected != Some(stage) {
            return Err(ScenarioError::StageOrder {
                after: self.last,
                found: stage,
            });
        }
        info!("Stage: {:?}", stage);
        self.last = Some(stage);
        Ok(())
    }

    pub fn last(&self) -> Option<Stage> {
        self.last
    }

    pub fn is_complete(&self) -> bool {
        self.last == Some(Stage::Persist)
    }
}

/// Allocation state shared by every run of one process.
///
/// Networks and VLAN ids accumulate across runs so a batch of runs never
/// hands out the same subnet twice. Nothing is reset between runs.
#[derive(Debug, Default)]
pub struct Session {
    pool: AllocationPool,
    vlans: VlanIdPool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(pool: AllocationPool) -> Self {
        Session {
            pool,
            vlans: VlanIdPool::new(),
        }
    }

    pub fn pool(&self) -> &AllocationPool {
        &self.pool
    }

    pub fn vlans(&self) -> &VlanIdPool {
        &self.vlans
    }

    /// Start a run of scenario `name` for identifier `id`.
    pub fn context(&mut self, name: &str, id: Option<&str>) -> ScenarioContext<'_> {
        let seed = id.unwrap_or(RANDOM_SEED).to_string();
        debug!("Seeding {} with {:?}", name, id);
        ScenarioContext {
            name: name.to_string(),
            seed,
            seeded: id.is_some(),
            developer: false,
            rng: seeded_rng(name, id),
            session: self,
        }
    }
}

/// State of one scenario run.
pub struct ScenarioContext<'a> {
    name: String,
    seed: String,
    seeded: bool,
    developer: bool,
    rng: ChaCha8Rng,
    session: &'a mut Session,
}

impl<'a> ScenarioContext<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identifier, or `"random"` for unseeded runs.
    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Developer runs add self-check commands to the setup stage.
    pub fn set_developer(&mut self, developer: bool) {
        self.developer = developer;
    }

    pub fn is_developer(&self) -> bool {
        self.developer
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Allocate a `/mask` network from the private blocks.
    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Net> {
        self.session.pool.generate(&mut self.rng, mask)
    }

    /// Allocate a `/mask` network from inside `cidr`.
    pub fn allocate_from(&mut self, mask: u8, cidr: Ipv4Net) -> Result<Ipv4Net> {
        self.session.pool.generate_from(&mut self.rng, mask, cidr)
    }

    pub fn next_vlan(&mut self) -> VlanId {
        self.session.vlans.next(&mut self.rng)
    }

    pub fn next_vlans(&mut self, count: usize) -> Vec<VlanId> {
        self.session.vlans.next_n(&mut self.rng, count)
    }

    /// `count` distinct ids from the session pool.
    pub fn next_distinct_vlans(&mut self, count: usize) -> Result<Vec<VlanId>> {
        self.session.vlans.next_distinct(&mut self.rng, count)
    }

    /// Host addresses of `network` in ascending order.
    pub fn host_pool(&self, network: Ipv4Net) -> HostAddressPool {
        HostAddressPool::new(network)
    }

    /// Host addresses of `network` shuffled with the run's random source.
    pub fn shuffled_host_pool(&mut self, network: Ipv4Net) -> HostAddressPool {
        HostAddressPool::shuffled(network, &mut self.rng)
    }
}

/// Where a scenario draws its VLAN ids from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VlanRange {
    /// Ids 1-9, small enough for students to scan by hand
    #[default]
    Scannable,
    /// The session's pool over the whole usable range
    Full,
}

impl VlanRange {
    /// Ids the range offers; a scenario cannot ask for more distinct ones.
    pub fn capacity(self) -> usize {
        match self {
            VlanRange::Scannable => SCANNABLE_VLANS.count(),
            VlanRange::Full => POOL_RANGE.count(),
        }
    }
}

/// Per-scenario overrides; anything unset is drawn from the run's random source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioOptions {
    pub prefix_len: Option<u8>,
    pub host_count: Option<usize>,
    pub switch_count: Option<usize>,
    pub vlan_count: Option<usize>,
    pub vlans: Option<Vec<VlanId>>,
    pub vlan_range: VlanRange,
    pub shape: Option<Shape>,
}

/// One prompt of the task sheet. An empty answer renders as a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub prompt: String,
    pub answer: String,
}

impl Question {
    pub fn ask(prompt: impl Into<String>, answer: impl Into<String>) -> Self {
        Question {
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }

    pub fn statement(prompt: impl Into<String>) -> Self {
        Self::ask(prompt, "")
    }

    pub fn is_statement(&self) -> bool {
        self.answer.is_empty()
    }
}

/// A shell command to run on a node once the emulation is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostCommand {
    pub target: String,
    pub command: String,
}

impl HostCommand {
    pub fn new(target: impl Into<String>, command: impl Into<String>) -> Self {
        HostCommand {
            target: target.into(),
            command: command.into(),
        }
    }
}

/// One instructional exercise.
///
/// The pipeline calls these in stage order: `create_network`, then `setup`
/// once the emulation runs, then `task` and `questions`.
pub trait Scenario {
    /// The topology under construction plus whatever the later stages need to know about it.
    type Network: AsRef<TopologyPlan> + AsMut<TopologyPlan>;

    /// Name shown to users and mixed into the seed.
    const NAME: &'static str;
    /// Presentation order, lowest first.
    const WEIGHT: i32;

    fn create_network(&self, ctx: &mut ScenarioContext<'_>) -> Result<Self::Network>;

    fn setup(&self, _ctx: &mut ScenarioContext<'_>, _net: &mut Self::Network) -> Result<Vec<HostCommand>> {
        Ok(Vec::new())
    }

    /// Task sheet paragraphs.
    fn task(&self, net: &Self::Network) -> Vec<String> {
        base_task(Self::NAME, net.as_ref())
    }

    fn questions(&self, net: &Self::Network) -> Vec<Question>;
}

/// Heading plus connection hint for the plan's Kali machine, if it has one.
pub fn base_task(name: &str, plan: &TopologyPlan) -> Vec<String> {
    let mut task = vec![name.to_string()];
    if let Some((kali, config)) = plan.hosts().iter().find_map(|h| match &h.kind {
        HostKind::Kali(config) => Some((h, config)),
        _ => None,
    }) {
        task.push(format!(
            "Connect to port {} with VNC or view http://10.10.0.1:{}/vnc_auto.html?port={} with a web browser to access the Kali machine for this task.",
            config.vnc_port, config.web_port, config.vnc_port
        ));
        task.push(format!(
            "NOTE: Many tools will use the default interface of eth0, the network for tasks is {}",
            kali.default_interface()
        ));
    }
    task
}

/// Host addresses of `hosts` sorted numerically, skipping unaddressed hosts.
pub(crate) fn sorted_ips<'h>(hosts: impl Iterator<Item = &'h HostNode>) -> Vec<Ipv4Addr> {
    let mut ips: Vec<Ipv4Addr> = hosts.filter_map(HostNode::ip).collect();
    ips.sort();
    ips
}
