//! IP address allocation and management module.
//!
//! This module hands out non-overlapping private subnets for every
//! participant network of a scenario, and individual host addresses inside
//! those subnets.

pub mod allocator;
pub mod registry;

// Re-export commonly used types
pub use allocator::{overlaps, AllocationPool, MAX_ALLOCATION_ATTEMPTS, PRIVATE_BLOCKS, RESERVED_BRIDGE};
pub use registry::{mac_for_address, HostAddressPool, HostAddressRegistry};
