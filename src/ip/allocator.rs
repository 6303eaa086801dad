//! Private subnet allocation.
//!
//! This file contains the core subnet allocation algorithm: pick a private
//! candidate block, draw a random subnet of the requested size inside it,
//! and retry until the draw does not overlap anything handed out before.
//! Every successful allocation is recorded in the [`AllocationPool`] so
//! later scenarios in the same session never reuse the address space.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::{debug, warn};
use rand::Rng;

use crate::error::{Result, ScenarioError};

/// RFC 1918 blocks subnets are drawn from when no explicit block is given.
pub const PRIVATE_BLOCKS: [Ipv4Net; 3] = [
    Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8),
    Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12),
    Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16),
];

/// Used by the container runtime for its internal bridge.
pub const RESERVED_BRIDGE: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(172, 17, 0, 0), 16);

/// Random draws attempted before a candidate block is declared exhausted.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 4096;

/// Returns true if the two networks share at least one address.
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    // CIDR blocks either nest or are disjoint
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Every network allocated during a session, seeded with the reserved bridge.
#[derive(Debug, Clone)]
pub struct AllocationPool {
    networks: Vec<Ipv4Net>,
    reserved: usize,
    candidates: Vec<Ipv4Net>,
    max_attempts: usize,
}

impl Default for AllocationPool {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationPool {
    pub fn new() -> Self {
        Self::with_candidates(PRIVATE_BLOCKS.to_vec())
    }

    /// A pool drawing from the given candidate blocks instead of RFC 1918.
    pub fn with_candidates(candidates: Vec<Ipv4Net>) -> Self {
        AllocationPool {
            networks: vec![RESERVED_BRIDGE],
            reserved: 1,
            candidates: candidates.into_iter().map(|c| c.trunc()).collect(),
            max_attempts: MAX_ALLOCATION_ATTEMPTS,
        }
    }

    /// Bound the number of random draws per allocation.
    pub fn set_max_attempts(&mut self, attempts: usize) {
        self.max_attempts = attempts.max(1);
    }

    /// Allocate a `/mask` subnet from a randomly chosen candidate block.
    ///
    /// Only candidate blocks at least as large as the requested subnet are
    /// eligible. If none is, the request fails with
    /// [`ScenarioError::InvalidMask`].
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R, mask: u8) -> Result<Ipv4Net> {
        if mask > 32 {
            return Err(ScenarioError::InvalidMask { mask });
        }
        let eligible: Vec<Ipv4Net> = self
            .candidates
            .iter()
            .filter(|c| c.prefix_len() <= mask)
            .copied()
            .collect();
        if eligible.is_empty() {
            return Err(ScenarioError::InvalidMask { mask });
        }
        let cidr = eligible[rng.gen_range(0..eligible.len() as u32) as usize];
        self.generate_from(rng, mask, cidr)
    }

    /// Allocate a `/mask` subnet from inside `cidr`.
    pub fn generate_from<R: Rng + ?Sized>(&mut self, rng: &mut R, mask: u8, cidr: Ipv4Net) -> Result<Ipv4Net> {
        let cidr = cidr.trunc();
        if mask > 32 || mask < cidr.prefix_len() {
            return Err(ScenarioError::InvalidMask { mask });
        }

        for attempt in 1..=self.max_attempts {
            let net = random_subnet(rng, &cidr, mask)?;
            if !self.overlaps(&net) {
                debug!("Allocated {} from {} after {} draw(s)", net, cidr, attempt);
                self.networks.push(net);
                return Ok(net);
            }
        }

        warn!("Gave up allocating a /{} in {} after {} draws", mask, cidr, self.max_attempts);
        Err(ScenarioError::AddressSpaceExhausted {
            mask,
            pool: cidr.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Check if the given network overlaps one already allocated or reserved.
    pub fn overlaps(&self, net: &Ipv4Net) -> bool {
        self.networks.iter().any(|n| overlaps(n, net))
    }

    /// Permanently reserve a block so nothing is allocated over it.
    ///
    /// Returns false, and reserves nothing, if the block is already in use.
    pub fn reserve(&mut self, net: Ipv4Net) -> bool {
        let net = net.trunc();
        if self.overlaps(&net) {
            return false;
        }
        self.networks.insert(self.reserved, net);
        self.reserved += 1;
        true
    }

    /// Networks handed out by `generate`, in allocation order.
    pub fn allocated(&self) -> &[Ipv4Net] {
        &self.networks[self.reserved..]
    }

    /// Reserved blocks followed by every allocated network.
    pub fn networks(&self) -> &[Ipv4Net] {
        &self.networks
    }

    pub fn last(&self) -> Option<&Ipv4Net> {
        self.allocated().last()
    }
}

/// Draw a random `/mask` subnet aligned inside `cidr`.
fn random_subnet<R: Rng + ?Sized>(rng: &mut R, cidr: &Ipv4Net, mask: u8) -> Result<Ipv4Net> {
    let bits = u32::from(mask - cidr.prefix_len());
    let draw: u64 = if bits == 0 { 0 } else { rng.gen_range(0..(1u64 << bits)) };
    let offset = draw << (32 - u32::from(mask));
    let base = u64::from(u32::from(cidr.network())) + offset;
    let base = u32::try_from(base).map_err(|_| ScenarioError::InvalidMask { mask })?;
    Ipv4Net::new(Ipv4Addr::from(base), mask).map_err(|_| ScenarioError::InvalidMask { mask })
}
