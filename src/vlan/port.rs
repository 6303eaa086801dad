//! Per-switch VLAN port attributes.
//!
//! Attributes are accumulated in memory while a topology is being built and
//! only pushed to the virtual switch control interface once, when the switch
//! is started. For each port the tag is pushed first, then the trunk set,
//! then the mode, because Open vSwitch interprets `vlan_mode` relative to
//! whatever tag and trunks the port already carries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::pool::VlanId;
use crate::error::{Result, ScenarioError};
use crate::platform::SwitchControl;

/// Open vSwitch `vlan_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VlanMode {
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "trunk")]
    Trunk,
    #[serde(rename = "native-tagged")]
    NativeTagged,
    #[default]
    #[serde(rename = "native-untagged")]
    NativeUntagged,
    #[serde(rename = "dot1q-tunnel")]
    Tunnel,
}

impl VlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VlanMode::Access => "access",
            VlanMode::Trunk => "trunk",
            VlanMode::NativeTagged => "native-tagged",
            VlanMode::NativeUntagged => "native-untagged",
            VlanMode::Tunnel => "dot1q-tunnel",
        }
    }
}

impl fmt::Display for VlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VLAN attributes recorded for one switch port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<VlanId>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub trunks: BTreeSet<VlanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<VlanMode>,
}

impl PortAttributes {
    /// The mode the port runs in; native-untagged unless set.
    pub fn effective_mode(&self) -> VlanMode {
        self.mode.unwrap_or_default()
    }
}

/// One attribute assignment sent to the switch control interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSetting {
    Tag(VlanId),
    Trunks(Vec<VlanId>),
    Mode(VlanMode),
}

impl PortSetting {
    /// The `column=value` form used by `ovs-vsctl set port`.
    pub fn assignment(&self) -> String {
        match self {
            PortSetting::Tag(tag) => format!("tag={}", tag),
            PortSetting::Trunks(trunks) => format!(
                "trunks={}",
                trunks.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(",")
            ),
            PortSetting::Mode(mode) => format!("vlan_mode={}", mode),
        }
    }
}

/// VLAN attributes of every port on one switch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VlanPortModel {
    ports: BTreeMap<String, PortAttributes>,
    #[serde(skip)]
    applied: bool,
}

impl VlanPortModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add VLANs to the port's trunk set. Repeated calls extend the set.
    pub fn add_trunk(&mut self, port: &str, vlans: &[VlanId]) {
        self.entry(port).trunks.extend(vlans.iter().copied());
    }

    /// Set the port's native/access VLAN, replacing any previous tag.
    pub fn add_tag(&mut self, port: &str, vlan: VlanId) {
        self.entry(port).tag = Some(vlan);
    }

    /// Set the port's VLAN mode, replacing any previous mode.
    pub fn add_mode(&mut self, port: &str, mode: VlanMode) {
        self.entry(port).mode = Some(mode);
    }

    pub fn port(&self, port: &str) -> Option<&PortAttributes> {
        self.ports.get(port)
    }

    pub fn ports(&self) -> impl Iterator<Item = (&str, &PortAttributes)> {
        self.ports.iter().map(|(name, attrs)| (name.as_str(), attrs))
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// The settings activation will push, in push order.
    pub fn settings(&self) -> Vec<(&str, PortSetting)> {
        let mut settings = Vec::new();
        for (port, attrs) in &self.ports {
            if let Some(tag) = attrs.tag {
                settings.push((port.as_str(), PortSetting::Tag(tag)));
            }
            if !attrs.trunks.is_empty() {
                settings.push((port.as_str(), PortSetting::Trunks(attrs.trunks.iter().copied().collect())));
            }
            // unset modes stay at whatever the switch already runs
            if let Some(mode) = attrs.mode {
                settings.push((port.as_str(), PortSetting::Mode(mode)));
            }
        }
        settings
    }

    /// Push every recorded attribute to `switch` through `control`.
    ///
    /// Must be called once the switch is running. Later calls do nothing.
    /// Returns the number of settings pushed.
    pub fn apply_at_activation(
        &mut self,
        switch: &str,
        control: &mut dyn SwitchControl,
        timeout: Duration,
    ) -> Result<usize> {
        if self.applied {
            warn!("VLAN attributes of {} were already applied", switch);
            return Ok(0);
        }

        let settings = self.settings();
        for (port, setting) in &settings {
            debug!("{}: set port {} {}", switch, port, setting.assignment());
            control
                .set_port(switch, port, setting, timeout)
                .map_err(|e| ScenarioError::platform(switch, *port, e))?;
        }
        let pushed = settings.len();
        self.applied = true;
        Ok(pushed)
    }

    fn entry(&mut self, port: &str) -> &mut PortAttributes {
        self.ports.entry(port.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use crate::platform::{PlatformEvent, RecordingPlatform};

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    #[test]
    fn test_trunks_accumulate() {
        let mut model = VlanPortModel::new();
        model.add_trunk("s0-eth1", &[vlan(10)]);
        model.add_trunk("s0-eth1", &[vlan(20)]);
        model.add_trunk("s0-eth1", &[vlan(10)]);
        let trunks: Vec<u16> = model.port("s0-eth1").unwrap().trunks.iter().map(|v| v.get()).collect();
        assert_eq!(trunks, vec![10, 20]);
    }

    #[test]
    fn test_tag_and_mode_replace() {
        let mut model = VlanPortModel::new();
        model.add_tag("s0-eth1", vlan(3));
        model.add_tag("s0-eth1", vlan(4));
        assert_eq!(model.port("s0-eth1").unwrap().effective_mode(), VlanMode::NativeUntagged);
        model.add_mode("s0-eth1", VlanMode::Access);
        model.add_mode("s0-eth1", VlanMode::NativeTagged);
        let attrs = model.port("s0-eth1").unwrap();
        assert_eq!(attrs.tag, Some(vlan(4)));
        assert_eq!(attrs.mode, Some(VlanMode::NativeTagged));
    }

    #[test]
    fn test_apply_pushes_tag_trunk_mode_once() {
        let mut model = VlanPortModel::new();
        model.add_mode("s1-eth2", VlanMode::Access);
        model.add_trunk("s1-eth1", &[vlan(7), vlan(5)]);
        model.add_tag("s1-eth1", vlan(5));
        model.add_tag("s1-eth2", vlan(7));

        let mut platform = RecordingPlatform::new();
        let timeout = Duration::from_secs(1);
        assert_eq!(model.apply_at_activation("s1", &mut platform, timeout).unwrap(), 4);
        assert!(model.is_applied());
        assert_eq!(model.apply_at_activation("s1", &mut platform, timeout).unwrap(), 0);

        let pushed: Vec<(String, String)> = platform
            .events()
            .iter()
            .filter_map(|e| match e {
                PlatformEvent::SetPort { port, setting, .. } => Some((port.clone(), setting.assignment())),
                _ => None,
            })
            .collect();
        assert_eq!(
            pushed,
            vec![
                ("s1-eth1".to_string(), "tag=5".to_string()),
                ("s1-eth1".to_string(), "trunks=5,7".to_string()),
                ("s1-eth2".to_string(), "tag=7".to_string()),
                ("s1-eth2".to_string(), "vlan_mode=access".to_string()),
            ]
        );
    }

    #[test]
    fn test_tag_only_port_gets_no_mode() {
        let mut model = VlanPortModel::new();
        model.add_tag("s2-eth3", vlan(6));
        model.add_trunk("s2-eth1", &[vlan(6)]);

        let settings = model.settings();
        assert_eq!(
            settings,
            vec![
                ("s2-eth1", PortSetting::Trunks(vec![vlan(6)])),
                ("s2-eth3", PortSetting::Tag(vlan(6))),
            ]
        );
        assert!(settings.iter().all(|(_, s)| !matches!(s, PortSetting::Mode(_))));
    }

    #[test]
    fn test_apply_failure_names_switch_and_port() {
        let mut model = VlanPortModel::new();
        model.add_tag("s4-eth1", vlan(2));
        let mut platform = RecordingPlatform::new();
        platform.make_unavailable("s4");

        match model.apply_at_activation("s4", &mut platform, Duration::from_millis(10)) {
            Err(ScenarioError::PlatformUnavailable { switch, port, source }) => {
                assert_eq!(switch, "s4");
                assert_eq!(port, "s4-eth1");
                assert!(matches!(source, PlatformError::Unavailable(_)));
            }
            other => panic!("expected platform failure, got {:?}", other),
        }
        assert!(!model.is_applied());
    }
}
