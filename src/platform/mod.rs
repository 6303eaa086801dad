//! External collaborators.
//!
//! The engine never manages containers or forwards packets itself. It hands
//! a resolved plan to an [`EmulationPlatform`] and pushes VLAN attributes
//! through a [`SwitchControl`]. Every call carries a timeout so a stuck
//! platform surfaces as an error instead of hanging the run.

use std::time::Duration;

use crate::error::PlatformError;
use crate::topology::{ControllerConfig, HostNode, Link, SwitchNode};
use crate::vlan::PortSetting;

pub mod recording;
pub mod vsctl;

pub use recording::{PlatformEvent, RecordingPlatform};
pub use vsctl::VsctlSwitchControl;

/// Virtual switch control plane accepting (switch, port, attribute) triples.
pub trait SwitchControl {
    fn set_port(&mut self, switch: &str, port: &str, setting: &PortSetting, timeout: Duration)
        -> Result<(), PlatformError>;
}

/// Node provisioning and link creation.
pub trait EmulationPlatform {
    fn add_switch(
        &mut self,
        switch: &SwitchNode,
        controller: Option<&ControllerConfig>,
        timeout: Duration,
    ) -> Result<(), PlatformError>;

    fn add_host(&mut self, host: &HostNode, timeout: Duration) -> Result<(), PlatformError>;

    fn add_link(&mut self, link: &Link, timeout: Duration) -> Result<(), PlatformError>;

    fn start_switch(&mut self, name: &str, timeout: Duration) -> Result<(), PlatformError>;

    fn start_host(&mut self, name: &str, timeout: Duration) -> Result<(), PlatformError>;

    /// Run a shell command on a started node and return its output.
    fn run_command(&mut self, target: &str, command: &str, timeout: Duration) -> Result<String, PlatformError>;

    /// The control plane of the switches this platform started.
    fn switch_control(&mut self) -> &mut dyn SwitchControl;
}
