//! VLAN identifier pool.
//!
//! Identifiers are drawn from a shuffled batch covering the whole pool
//! range. A batch never repeats an identifier; once it is used up a fresh
//! batch is shuffled, so identifiers can repeat across that boundary.

use std::fmt;
use std::ops::RangeInclusive;

use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScenarioError};

/// Default pool range; 0 (untagged) and 0xFFF (reserved) are never drawn.
pub const POOL_RANGE: RangeInclusive<u16> = 1..=0xFFD;

/// An 802.1Q VLAN identifier in 1..=4094.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 4094;

    pub fn new(id: u16) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(VlanId(id))
        } else {
            Err(ScenarioError::InvalidVlanId(id))
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ScenarioError;

    fn try_from(id: u16) -> Result<Self> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(id: VlanId) -> u16 {
        id.0
    }
}

/// Reject a VLAN list that names the same identifier twice.
pub fn ensure_distinct(ids: &[VlanId]) -> Result<()> {
    for (i, id) in ids.iter().enumerate() {
        if ids[..i].contains(id) {
            return Err(ScenarioError::DuplicateVlanId(id.get()));
        }
    }
    Ok(())
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shuffled working set of unused VLAN identifiers.
#[derive(Debug, Clone)]
pub struct VlanIdPool {
    range: RangeInclusive<u16>,
    unused: Vec<VlanId>,
    batches: u32,
}

impl Default for VlanIdPool {
    fn default() -> Self {
        Self::new()
    }
}

impl VlanIdPool {
    pub fn new() -> Self {
        VlanIdPool {
            range: POOL_RANGE,
            unused: Vec::new(),
            batches: 0,
        }
    }

    /// A pool restricted to `range`, e.g. a small range students can scan.
    pub fn with_range(range: RangeInclusive<u16>) -> Result<Self> {
        if range.is_empty() {
            return Err(ScenarioError::InvalidVlanId(*range.start()));
        }
        VlanId::new(*range.start())?;
        VlanId::new(*range.end())?;
        Ok(VlanIdPool {
            range,
            unused: Vec::new(),
            batches: 0,
        })
    }

    /// Next unused identifier, shuffling a new batch if the current one is spent.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> VlanId {
        loop {
            if let Some(id) = self.unused.pop() {
                return id;
            }
            self.regenerate(rng);
        }
    }

    /// `count` identifiers, in draw order.
    pub fn next_n<R: Rng + ?Sized>(&mut self, rng: &mut R, count: usize) -> Vec<VlanId> {
        (0..count).map(|_| self.next(rng)).collect()
    }

    /// `count` distinct identifiers, in draw order.
    ///
    /// Fails instead of refilling when the pool range holds fewer than
    /// `count` identifiers. Repeats across a batch boundary are skipped.
    pub fn next_distinct<R: Rng + ?Sized>(&mut self, rng: &mut R, count: usize) -> Result<Vec<VlanId>> {
        let capacity = self.capacity();
        if count > capacity {
            return Err(ScenarioError::VlanPoolExhausted {
                requested: count,
                capacity,
            });
        }
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            let id = self.next(rng);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Identifiers left in the current batch.
    pub fn remaining(&self) -> usize {
        self.unused.len()
    }

    /// Number of batches shuffled so far.
    pub fn batches(&self) -> u32 {
        self.batches
    }

    pub fn capacity(&self) -> usize {
        self.range.clone().count()
    }

    fn regenerate<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.unused = self.range.clone().map(VlanId).collect();
        self.unused.shuffle(rng);
        self.batches += 1;
        debug!(
            "Shuffled VLAN batch {} over {}-{}",
            self.batches,
            self.range.start(),
            self.range.end()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_vlan_id_bounds() {
        assert!(VlanId::new(0).is_err());
        assert!(VlanId::new(4095).is_err());
        assert_eq!(VlanId::new(1).unwrap().get(), 1);
        assert_eq!(VlanId::new(4094).unwrap().get(), 4094);
        assert!(serde_yaml::from_str::<VlanId>("4095").is_err());
        assert_eq!(serde_yaml::from_str::<VlanId>("12").unwrap(), VlanId::new(12).unwrap());
    }

    #[test]
    fn test_next_n_distinct() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut pool = VlanIdPool::new();
        let ids = pool.next_n(&mut rng, 5);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 5);
        assert_eq!(pool.remaining(), 4093 - 5);
    }

    #[test]
    fn test_repeat_only_after_full_batch() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut pool = VlanIdPool::new();
        assert_eq!(pool.capacity(), 4093);

        let mut seen = HashSet::new();
        let mut first_repeat = None;
        for i in 0..5000 {
            let id = pool.next(&mut rng);
            assert!((1..=0xFFD).contains(&id.get()));
            if !seen.insert(id) && first_repeat.is_none() {
                first_repeat = Some(i);
            }
        }
        assert_eq!(seen.len(), 4093);
        assert!(first_repeat.unwrap() >= 4093);
        assert_eq!(pool.batches(), 2);
    }

    #[test]
    fn test_bounded_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut pool = VlanIdPool::with_range(1..=9).unwrap();
        let mut ids: Vec<u16> = pool.next_n(&mut rng, 9).into_iter().map(u16::from).collect();
        ids.sort();
        assert_eq!(ids, (1..=9).collect::<Vec<_>>());

        assert!(VlanIdPool::with_range(0..=9).is_err());
        assert!(VlanIdPool::with_range(10..=9).is_err());
    }

    #[test]
    fn test_next_distinct_refuses_to_refill() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut pool = VlanIdPool::with_range(1..=9).unwrap();
        assert!(matches!(
            pool.next_distinct(&mut rng, 12),
            Err(ScenarioError::VlanPoolExhausted { requested: 12, capacity: 9 })
        ));

        let ids = pool.next_distinct(&mut rng, 9).unwrap();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 9);
    }

    #[test]
    fn test_next_distinct_skips_repeats_across_batches() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut pool = VlanIdPool::with_range(1..=9).unwrap();
        pool.next_n(&mut rng, 7);

        // two left in this batch, the rest come from a fresh shuffle
        let ids = pool.next_distinct(&mut rng, 6).unwrap();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(pool.batches(), 2);
    }

    #[test]
    fn test_ensure_distinct() {
        let ids: Vec<VlanId> = [3, 5, 8].iter().map(|i| VlanId::new(*i).unwrap()).collect();
        assert!(ensure_distinct(&ids).is_ok());

        let repeated: Vec<VlanId> = [3, 5, 3].iter().map(|i| VlanId::new(*i).unwrap()).collect();
        assert!(matches!(ensure_distinct(&repeated), Err(ScenarioError::DuplicateVlanId(3))));
    }
}
