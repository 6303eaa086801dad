//! VLAN attribute model.
//!
//! This module contains the VLAN identifier type, the shuffled identifier
//! pool scenarios draw tags from, and the per-switch port attribute model
//! that is pushed to the virtual switch when the switch is started.

pub mod pool;
pub mod port;

pub use pool::{ensure_distinct, VlanId, VlanIdPool, POOL_RANGE};
pub use port::{PortAttributes, PortSetting, VlanMode, VlanPortModel};
