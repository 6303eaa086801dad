//! Catalogue of available scenarios.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dhcp::{DhcpIntro, DhcpStarvation};
use super::pipeline::{run, RunOutcome, RunSettings};
use super::scanning::{HostScanning, PortScanning};
use super::sniffing::{ArpPoisoning, CamFlooding, PacketSniffing};
use super::stp::SpanningTree;
use super::vlan::{VlanDoubleTagging, VlanTrunking};
use super::{Scenario, ScenarioOptions, Session};
use crate::error::Result;
use crate::output::DocumentSink;
use crate::platform::EmulationPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    HostScanning,
    PortScanning,
    PacketSniffing,
    ArpPoisoning,
    CamFlooding,
    DhcpIntro,
    DhcpStarvation,
    VlanTrunking,
    VlanDoubleTagging,
    SpanningTree,
}

impl ScenarioKind {
    /// Every scenario in presentation order.
    pub fn all() -> Vec<ScenarioKind> {
        let mut kinds = vec![
            ScenarioKind::HostScanning,
            ScenarioKind::PortScanning,
            ScenarioKind::PacketSniffing,
            ScenarioKind::ArpPoisoning,
            ScenarioKind::CamFlooding,
            ScenarioKind::DhcpIntro,
            ScenarioKind::DhcpStarvation,
            ScenarioKind::VlanTrunking,
            ScenarioKind::VlanDoubleTagging,
            ScenarioKind::SpanningTree,
        ];
        kinds.sort_by_key(|k| k.weight());
        kinds
    }

    pub fn name(self) -> &'static str {
        match self {
            ScenarioKind::HostScanning => HostScanning::NAME,
            ScenarioKind::PortScanning => PortScanning::NAME,
            ScenarioKind::PacketSniffing => PacketSniffing::NAME,
            ScenarioKind::ArpPoisoning => ArpPoisoning::NAME,
            ScenarioKind::CamFlooding => CamFlooding::NAME,
            ScenarioKind::DhcpIntro => DhcpIntro::NAME,
            ScenarioKind::DhcpStarvation => DhcpStarvation::NAME,
            ScenarioKind::VlanTrunking => VlanTrunking::NAME,
            ScenarioKind::VlanDoubleTagging => VlanDoubleTagging::NAME,
            ScenarioKind::SpanningTree => SpanningTree::NAME,
        }
    }

    pub fn weight(self) -> i32 {
        match self {
            ScenarioKind::HostScanning => HostScanning::WEIGHT,
            ScenarioKind::PortScanning => PortScanning::WEIGHT,
            ScenarioKind::PacketSniffing => PacketSniffing::WEIGHT,
            ScenarioKind::ArpPoisoning => ArpPoisoning::WEIGHT,
            ScenarioKind::CamFlooding => CamFlooding::WEIGHT,
            ScenarioKind::DhcpIntro => DhcpIntro::WEIGHT,
            ScenarioKind::DhcpStarvation => DhcpStarvation::WEIGHT,
            ScenarioKind::VlanTrunking => VlanTrunking::WEIGHT,
            ScenarioKind::VlanDoubleTagging => VlanDoubleTagging::WEIGHT,
            ScenarioKind::SpanningTree => SpanningTree::WEIGHT,
        }
    }

    /// Whether the kind reads any of the layout options.
    pub fn accepts_options(self) -> bool {
        !matches!(
            self,
            ScenarioKind::PacketSniffing
                | ScenarioKind::ArpPoisoning
                | ScenarioKind::CamFlooding
                | ScenarioKind::DhcpIntro
                | ScenarioKind::DhcpStarvation
        )
    }

    /// Run one scenario of this kind through the full pipeline.
    pub fn run(
        self,
        options: &ScenarioOptions,
        session: &mut Session,
        id: Option<&str>,
        platform: &mut dyn EmulationPlatform,
        sink: &mut dyn DocumentSink,
        settings: &RunSettings,
    ) -> Result<RunOutcome> {
        let options = options.clone();
        match self {
            ScenarioKind::HostScanning => run(&HostScanning { options }, session, id, platform, sink, settings),
            ScenarioKind::PortScanning => run(&PortScanning { options }, session, id, platform, sink, settings),
            ScenarioKind::PacketSniffing => run(&PacketSniffing, session, id, platform, sink, settings),
            ScenarioKind::ArpPoisoning => run(&ArpPoisoning, session, id, platform, sink, settings),
            ScenarioKind::CamFlooding => run(&CamFlooding, session, id, platform, sink, settings),
            ScenarioKind::DhcpIntro => run(&DhcpIntro, session, id, platform, sink, settings),
            ScenarioKind::DhcpStarvation => run(&DhcpStarvation, session, id, platform, sink, settings),
            ScenarioKind::VlanTrunking => run(&VlanTrunking { options }, session, id, platform, sink, settings),
            ScenarioKind::VlanDoubleTagging => {
                run(&VlanDoubleTagging { options }, session, id, platform, sink, settings)
            }
            ScenarioKind::SpanningTree => run(&SpanningTree { options }, session, id, platform, sink, settings),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
