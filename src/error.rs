//! Error types shared by the generation engine.
//!
//! Allocation and id-generation failures are fatal to the scenario run that
//! raised them; nothing in this crate retries at a higher level. Platform
//! failures carry the switch/port they happened on so the operator can tell
//! which part of the topology refused to come up.

use std::time::Duration;

use crate::scenario::Stage;

/// Failures raised while generating or activating a scenario topology.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Host mask /{mask} cannot fit in any candidate address pool")]
    InvalidMask { mask: u8 },

    #[error("No free /{mask} subnet found in {pool} after {attempts} attempts")]
    AddressSpaceExhausted {
        mask: u8,
        pool: String,
        attempts: usize,
    },

    #[error("Platform unavailable at switch {switch} port {port}: {source}")]
    PlatformUnavailable {
        switch: String,
        port: String,
        #[source]
        source: PlatformError,
    },

    #[error("Topology shape error: {0}")]
    TopologyShape(String),

    #[error("VLAN id {0} is outside the usable range 1-4094")]
    InvalidVlanId(u16),

    #[error("Cannot draw {requested} distinct VLAN ids from a pool of {capacity}")]
    VlanPoolExhausted { requested: usize, capacity: usize },

    #[error("VLAN id {0} is listed more than once")]
    DuplicateVlanId(u16),

    #[error("Network {network} has no host addresses left")]
    HostPoolExhausted { network: String },

    #[error("Host address {address} is already assigned to {owner}")]
    AddressConflict { address: String, owner: String },

    #[error("Stage {found:?} cannot run after {after:?}")]
    StageOrder { after: Option<Stage>, found: Stage },

    #[error("Failed to persist documents: {0}")]
    Persist(String),
}

/// Failures reported by the external emulation platform or switch control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("call did not finish within {0:?}")]
    Timeout(Duration),

    #[error("command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{0}")]
    Unavailable(String),
}

impl ScenarioError {
    /// Lift a platform failure into the scenario taxonomy with location context.
    pub fn platform(switch: impl Into<String>, port: impl Into<String>, source: PlatformError) -> Self {
        ScenarioError::PlatformUnavailable {
            switch: switch.into(),
            port: port.into(),
            source,
        }
    }
}

pub type Result<T, E = ScenarioError> = std::result::Result<T, E>;
