//! Host address registry.
//!
//! This file hands out individual host addresses from an allocated network
//! and keeps a registry of which node owns which address, so no two nodes
//! in a topology are ever given the same address.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Result, ScenarioError};

/// Usable host addresses of one network, consumed as participants are placed.
#[derive(Debug, Clone)]
pub struct HostAddressPool {
    network: Ipv4Net,
    addresses: Vec<Ipv4Addr>,
}

impl HostAddressPool {
    /// Host addresses in ascending order (network and broadcast excluded).
    pub fn new(network: Ipv4Net) -> Self {
        HostAddressPool {
            network,
            addresses: network.hosts().collect(),
        }
    }

    /// Host addresses in an order drawn from `rng`.
    pub fn shuffled<R: Rng + ?Sized>(network: Ipv4Net, rng: &mut R) -> Self {
        let mut pool = Self::new(network);
        pool.addresses.shuffle(rng);
        pool
    }

    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Take the last remaining address.
    pub fn pop(&mut self) -> Result<Ipv4Addr> {
        self.addresses.pop().ok_or_else(|| self.exhausted())
    }

    /// Take the first remaining address (lowest, for an unshuffled pool).
    pub fn take_first(&mut self) -> Result<Ipv4Addr> {
        if self.addresses.is_empty() {
            return Err(self.exhausted());
        }
        Ok(self.addresses.remove(0))
    }

    /// Take a uniformly random remaining address.
    pub fn take_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Ipv4Addr> {
        if self.addresses.is_empty() {
            return Err(self.exhausted());
        }
        // u32 draw keeps the sequence identical on 32 and 64 bit targets
        let idx = rng.gen_range(0..self.addresses.len() as u32) as usize;
        Ok(self.addresses.remove(idx))
    }

    /// `address` with this pool's prefix length, as assigned to an interface.
    pub fn interface(&self, address: Ipv4Addr) -> Result<Ipv4Net> {
        Ipv4Net::new(address, self.network.prefix_len()).map_err(|_| ScenarioError::InvalidMask {
            mask: self.network.prefix_len(),
        })
    }

    /// Remaining addresses, next to be popped last.
    pub fn remaining(&self) -> &[Ipv4Addr] {
        &self.addresses
    }

    fn exhausted(&self) -> ScenarioError {
        ScenarioError::HostPoolExhausted {
            network: self.network.to_string(),
        }
    }
}

/// Tracks every host address assigned within one topology.
#[derive(Debug, Clone, Default)]
pub struct HostAddressRegistry {
    assigned: BTreeMap<Ipv4Addr, String>,
}

impl HostAddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address` for `owner`. Re-registering for the same owner is a no-op.
    pub fn assign(&mut self, address: Ipv4Addr, owner: &str) -> Result<()> {
        match self.assigned.get(&address) {
            Some(existing) if existing != owner => Err(ScenarioError::AddressConflict {
                address: address.to_string(),
                owner: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.assigned.insert(address, owner.to_string());
                Ok(())
            }
        }
    }

    pub fn is_assigned(&self, address: &Ipv4Addr) -> bool {
        self.assigned.contains_key(address)
    }

    pub fn owner_of(&self, address: &Ipv4Addr) -> Option<&str> {
        self.assigned.get(address).map(String::as_str)
    }

    /// All assignments, ordered by address.
    pub fn assignments(&self) -> impl Iterator<Item = (&Ipv4Addr, &str)> {
        self.assigned.iter().map(|(ip, owner)| (ip, owner.as_str()))
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

/// Locally administered MAC derived from a host address.
pub fn mac_for_address(address: Ipv4Addr) -> String {
    let [a, b, c, d] = address.octets();
    format!("02:00:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d)
}
