//! In-memory platform that records every call.
//!
//! Used for dry runs and as the test double for the external emulator. It
//! can forward VLAN pushes to a real switch control, and can be told to
//! fail every call that touches a given node.

use std::collections::HashSet;
use std::time::Duration;

use log::{debug, trace};
use serde::Serialize;

use super::{EmulationPlatform, SwitchControl};
use crate::error::PlatformError;
use crate::topology::{ControllerConfig, HostNode, Link, SwitchNode};
use crate::vlan::PortSetting;

/// One call made against the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    AddSwitch { name: String },
    AddHost { name: String, image: Option<String> },
    AddLink { left: String, right: String },
    StartSwitch { name: String },
    StartHost { name: String },
    Command { target: String, command: String },
    SetPort { switch: String, port: String, setting: PortSetting },
}

#[derive(Default)]
pub struct RecordingPlatform {
    events: Vec<PlatformEvent>,
    unavailable: HashSet<String>,
    added_switches: HashSet<String>,
    started_switches: HashSet<String>,
    forward: Option<Box<dyn SwitchControl>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record everything, and also push port settings to `control`.
    pub fn forwarding_to(control: Box<dyn SwitchControl>) -> Self {
        RecordingPlatform {
            forward: Some(control),
            ..Default::default()
        }
    }

    /// Fail every later call that touches `node`.
    pub fn make_unavailable(&mut self, node: impl Into<String>) {
        self.unavailable.insert(node.into());
    }

    pub fn events(&self) -> &[PlatformEvent] {
        &self.events
    }

    fn check(&self, node: &str) -> Result<(), PlatformError> {
        if self.unavailable.contains(node) {
            return Err(PlatformError::Unavailable(format!("{} does not respond", node)));
        }
        Ok(())
    }

    fn record(&mut self, event: PlatformEvent) {
        trace!("{:?}", event);
        self.events.push(event);
    }
}

impl SwitchControl for RecordingPlatform {
    fn set_port(
        &mut self,
        switch: &str,
        port: &str,
        setting: &PortSetting,
        timeout: Duration,
    ) -> Result<(), PlatformError> {
        self.check(switch)?;
        if self.added_switches.contains(switch) && !self.started_switches.contains(switch) {
            return Err(PlatformError::Unavailable(format!("switch {} is not running", switch)));
        }
        if let Some(control) = self.forward.as_mut() {
            control.set_port(switch, port, setting, timeout)?;
        }
        self.record(PlatformEvent::SetPort {
            switch: switch.to_string(),
            port: port.to_string(),
            setting: setting.clone(),
        });
        Ok(())
    }
}

impl EmulationPlatform for RecordingPlatform {
    fn add_switch(
        &mut self,
        switch: &SwitchNode,
        controller: Option<&ControllerConfig>,
        _timeout: Duration,
    ) -> Result<(), PlatformError> {
        self.check(&switch.name)?;
        debug!("Provisioning switch {} (controller {:?})", switch.name, controller);
        self.added_switches.insert(switch.name.clone());
        self.record(PlatformEvent::AddSwitch {
            name: switch.name.clone(),
        });
        Ok(())
    }

    fn add_host(&mut self, host: &HostNode, _timeout: Duration) -> Result<(), PlatformError> {
        self.check(&host.name)?;
        self.record(PlatformEvent::AddHost {
            name: host.name.clone(),
            image: host.kind.image().map(str::to_string),
        });
        Ok(())
    }

    fn add_link(&mut self, link: &Link, _timeout: Duration) -> Result<(), PlatformError> {
        self.check(&link.left.node)?;
        self.check(&link.right.node)?;
        self.record(PlatformEvent::AddLink {
            left: link.left.interface.clone(),
            right: link.right.interface.clone(),
        });
        Ok(())
    }

    fn start_switch(&mut self, name: &str, _timeout: Duration) -> Result<(), PlatformError> {
        self.check(name)?;
        self.started_switches.insert(name.to_string());
        self.record(PlatformEvent::StartSwitch { name: name.to_string() });
        Ok(())
    }

    fn start_host(&mut self, name: &str, _timeout: Duration) -> Result<(), PlatformError> {
        self.check(name)?;
        self.record(PlatformEvent::StartHost { name: name.to_string() });
        Ok(())
    }

    fn run_command(&mut self, target: &str, command: &str, _timeout: Duration) -> Result<String, PlatformError> {
        self.check(target)?;
        self.record(PlatformEvent::Command {
            target: target.to_string(),
            command: command.to_string(),
        });
        Ok(String::new())
    }

    fn switch_control(&mut self) -> &mut dyn SwitchControl {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{SwitchConfig, TopologyPlan};
    use crate::vlan::{VlanId, VlanMode};

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn test_set_port_before_start_fails() {
        let mut plan = TopologyPlan::new(None);
        let s0 = plan.add_switch("s0", SwitchConfig::default()).unwrap();
        let mut platform = RecordingPlatform::new();
        platform.add_switch(plan.switch(s0).unwrap(), None, T).unwrap();

        let setting = PortSetting::Tag(VlanId::new(3).unwrap());
        assert!(platform.set_port("s0", "s0-eth1", &setting, T).is_err());
        platform.start_switch("s0", T).unwrap();
        platform.set_port("s0", "s0-eth1", &setting, T).unwrap();
        assert_eq!(platform.events().len(), 3);
    }

    #[test]
    fn test_forwarding() {
        let mut platform = RecordingPlatform::forwarding_to(Box::new(RecordingPlatform::new()));
        platform
            .switch_control()
            .set_port("s1", "s1-eth2", &PortSetting::Mode(VlanMode::Access), T)
            .unwrap();
        assert!(matches!(
            platform.events(),
            [PlatformEvent::SetPort { switch, .. }] if switch == "s1"
        ));

        let mut broken = RecordingPlatform::new();
        broken.make_unavailable("s1");
        let mut platform = RecordingPlatform::forwarding_to(Box::new(broken));
        assert!(platform
            .set_port("s1", "s1-eth2", &PortSetting::Mode(VlanMode::Access), T)
            .is_err());
        assert!(platform.events().is_empty());
    }

    #[test]
    fn test_unavailable_command_target() {
        let mut platform = RecordingPlatform::new();
        platform.make_unavailable("kali");
        assert_eq!(
            platform.run_command("kali", "true", T),
            Err(PlatformError::Unavailable("kali does not respond".to_string()))
        );
        assert_eq!(platform.run_command("h1", "true", T), Ok(String::new()));
    }
}
