//! Network topology module.
//!
//! This module contains the switch graph shapes, the builder that turns a
//! shape into switches and links, and the resolved plan handed to the
//! emulation platform.

pub mod builder;
pub mod plan;
pub mod shape;
pub mod types;

// Re-export key types and functions for easier access
pub use builder::{build, switch_name};
pub use plan::TopologyPlan;
pub use shape::{Shape, ShapeGenerator, TopologyGraph};
pub use types::{
    ControllerConfig, DhcpdConfig, Endpoint, FailMode, FtpUser, FtpdConfig, HostId, HostKind, HostNode, KaliConfig,
    Link, LinkConfig, LinkId, NodeRef, StpMode, SwitchConfig, SwitchId, SwitchNode,
};
