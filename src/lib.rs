//! # Segnet - Reproducible segmented networks for security exercises
//!
//! This library builds small emulated networks (switches, hosts and links)
//! for hands-on network security exercises, together with the task and
//! answer sheets that go with them.
//!
//! ## Overview
//!
//! Every exercise is generated from a scenario name and a per-student
//! identifier. The same pair always produces the same subnets, VLAN tags,
//! host placement and answers, so a teacher can regenerate any student's
//! answer sheet later. Scenarios generated together in one session never
//! share address space.
//!
//! ## Key Features
//!
//! - **Subnet allocation**: random, non-overlapping IPv4 networks from the
//!   RFC 1918 blocks, avoiding the container bridge block
//! - **VLAN planning**: tag pools, access/trunk port attributes pushed to
//!   virtual switches once they are running
//! - **Topology shapes**: path, cycle, star, complete or tree switch graphs
//! - **Scenario catalogue**: scanning, sniffing, ARP/CAM/DHCP attacks, VLAN
//!   hopping and spanning tree exercises
//! - **Reproducible**: seeded from the scenario name and identifier
//!
//! ## Architecture
//!
//! - `config`: Batch configuration structures and validation
//! - `config_loader`: Configuration file loading and CLI overrides
//! - `error`: Scenario and platform error types
//! - `ip`: Subnet allocation and host address pools
//! - `vlan`: VLAN id pool and per-switch port model
//! - `topology`: Switch graphs, node configuration and the topology plan
//! - `platform`: Emulation platform and switch control collaborators
//! - `scenario`: Seeding, sessions, the run pipeline and every scenario
//! - `output`: Task and answer sheet persistence
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use segnet::output::DirectorySink;
//! use segnet::platform::RecordingPlatform;
//! use segnet::scenario::{RunSettings, ScenarioKind, ScenarioOptions, Session};
//!
//! let mut session = Session::new();
//! let mut platform = RecordingPlatform::new();
//! let mut sink = DirectorySink::new("student", "teacher");
//!
//! let outcome = ScenarioKind::VlanTrunking.run(
//!     &ScenarioOptions::default(),
//!     &mut session,
//!     Some("1001"),
//!     &mut platform,
//!     &mut sink,
//!     &RunSettings::default(),
//! )?;
//!
//! // teacher/VLAN Scanning-1001.yaml now holds the answers
//! println!("{} switches", outcome.plan.switches().len());
//! # Ok::<(), segnet::error::ScenarioError>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   role: teacher
//!   platform_timeout: "30s"
//! scenarios:
//!   - kind: vlan_trunking
//!     seeds: ["1001", "1002"]
//!     options:
//!       prefix_len: 26
//! ```
//!
//! ## Error Handling
//!
//! Library functions return typed errors from `error`; the binary reports
//! them through `color_eyre`.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod ip;
pub mod output;
pub mod platform;
pub mod scenario;
pub mod topology;
pub mod vlan;
