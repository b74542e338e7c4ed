//! The epoch/list CLOCK-Pro realisation: three rings (hot, cold,
//! non-resident) plus a per-descriptor epoch standing in for the
//! three-hand variant's test-hand and in-test flag.
//!
//! Structurally this is `VersionedCacheShard` (`examples/sicikh-quick-cache`)
//! with the value/version/weight dimensions removed: a
//! `hashbrown::raw::RawTable<Token>` indexes into a [`LinkedSlab`] arena by
//! hash, exactly as `VersionedCacheShard::map`/`entries` do, and
//! `evict`/`scan_cold`(`advance_cold`)/`scan_hot`(`advance_hot`)/
//! `scan_non_resident`(`advance_ghost`) follow the same shape. The
//! behavioral difference is that promotion/demotion decisions are driven by
//! comparing epochs (`in_test_period`) rather than the
//! `ColdInTest`/`ColdDemoted` state split quick_cache uses, per this
//! engine's test-period predicate.

mod descriptor;

pub use descriptor::{Descriptor, Status};

use std::hash::{BuildHasher, Hash, Hasher};

use hashbrown::raw::RawTable;

use crate::config::{Config, ConfigError};
use crate::controller::AdaptiveController;
use crate::slab::{LinkedSlab, Token};
use crate::stats::{Stats, StatsSnapshot};
use crate::{DefaultHashBuilder, Policy};

/// A CLOCK-Pro replacement engine using the epoch/list realisation.
pub struct EpochPolicy<K, S = DefaultHashBuilder> {
    hash_builder: S,
    map: RawTable<Token>,
    entries: LinkedSlab<Descriptor<K>>,
    hot_head: Option<Token>,
    cold_head: Option<Token>,
    non_resident_head: Option<Token>,
    size_hot: usize,
    size_cold: usize,
    size_non_resident: usize,
    max_size: usize,
    controller: AdaptiveController,
    epoch: u64,
    stats: Stats,
}

impl<K: Eq + Hash> EpochPolicy<K, DefaultHashBuilder> {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K: Eq + Hash, S: BuildHasher> EpochPolicy<K, S> {
    pub fn with_hasher(config: Config, hash_builder: S) -> Result<Self, ConfigError> {
        let controller = AdaptiveController::new(&config)?;
        Ok(Self {
            hash_builder,
            map: RawTable::with_capacity(0),
            entries: LinkedSlab::with_capacity(0),
            hot_head: None,
            cold_head: None,
            non_resident_head: None,
            size_hot: 0,
            size_cold: 0,
            size_non_resident: 0,
            max_size: config.maximum_size,
            controller,
            epoch: 0,
            stats: Stats::default(),
        })
    }

    /// Number of resident (hot + cold) descriptors.
    pub fn len(&self) -> usize {
        self.size_hot + self.size_cold
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    #[inline]
    fn hash_static(hash_builder: &S, key: &K) -> u64 {
        let mut hasher = hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        Self::hash_static(&self.hash_builder, key)
    }

    fn search(&self, hash: u64, key: &K) -> Option<Token> {
        self.map
            .get(hash, |&idx| {
                let (d, _) = self.entries.get(idx).unwrap();
                &d.key == key
            })
            .copied()
    }

    fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// §4.3's test-period predicate: a descriptor is on probation as long
    /// as the oldest hot descriptor's epoch has not overtaken it (or there
    /// are no hot descriptors at all).
    fn in_test_period(&self, d: &Descriptor<K>) -> bool {
        match self.hot_head {
            None => true,
            Some(hot_head) => {
                let (oldest_hot, _) = self.entries.get(hot_head).unwrap();
                d.epoch > oldest_hot.epoch
            }
        }
    }

    fn remove_entry(&mut self, idx: Token, head: &mut Option<Token>) {
        self.entries.unlink_at(idx, head);
        let (d, _) = self.entries.remove(idx).unwrap();
        let hash = Self::hash_static(&self.hash_builder, &d.key);
        let removed = self.map.erase_entry(hash, |&t| t == idx);
        debug_assert!(removed, "descriptor missing from the key index");
    }

    fn insert_new(&mut self, key: K, hash: u64) {
        let epoch = self.next_epoch();
        let free_slots = self.max_size.saturating_sub(self.size_hot + self.size_cold);
        let enter_hot = free_slots > 0 && free_slots > self.controller.min_cold();
        let descriptor = Descriptor {
            key,
            status: if enter_hot { Status::Hot } else { Status::Cold },
            referenced: Default::default(),
            epoch,
        };
        let idx = if enter_hot {
            let idx = self.entries.insert(descriptor, self.hot_head);
            if self.hot_head.is_none() {
                self.hot_head = Some(idx);
            }
            self.size_hot += 1;
            idx
        } else {
            let idx = self.entries.insert(descriptor, self.cold_head);
            if self.cold_head.is_none() {
                self.cold_head = Some(idx);
            }
            self.size_cold += 1;
            idx
        };
        self.map.insert(hash, idx, |&existing| {
            let (d, _) = self.entries.get(existing).unwrap();
            Self::hash_static(&self.hash_builder, &d.key)
        });
        // Warm-up (§4.3): while the resident set isn't yet full, a miss
        // bypasses eviction entirely — `free_slots` was computed before
        // this insert, so `== 0` means the set was already full.
        if free_slots == 0 {
            self.evict();
        }
    }

    /// Case 3: a miss on a NON_RESIDENT descriptor, the re-fault that drives
    /// adaptation.
    fn refault(&mut self, idx: Token) {
        self.entries.unlink_at(idx, &mut self.non_resident_head);
        self.size_non_resident -= 1;

        let promoted = self.can_promote(idx);
        let epoch = self.next_epoch();
        let status = if promoted { Status::Hot } else { Status::Cold };
        {
            let (d, _) = self.entries.get_mut(idx).unwrap();
            d.status = status;
            d.epoch = epoch;
        }
        match status {
            Status::Hot => {
                self.entries.link_at(idx, &mut self.hot_head);
                self.size_hot += 1;
            }
            Status::Cold => {
                self.entries.link_at(idx, &mut self.cold_head);
                self.size_cold += 1;
            }
            Status::NonResident => unreachable!("refault always resolves to hot or cold"),
        }
        self.evict();
    }

    fn evict(&mut self) {
        self.stats.record_eviction();
        while self.size_hot + self.size_cold > self.max_size {
            if self.size_cold > 0 {
                self.scan_cold();
            } else {
                self.scan_hot(self.epoch);
            }
        }
        self.prune();
    }

    /// Examines the oldest COLD descriptor.
    fn scan_cold(&mut self) {
        debug_assert!(self.size_cold > 0);
        let idx = self.cold_head.unwrap();
        let referenced = {
            let (d, _) = self.entries.get_mut(idx).unwrap();
            let was_referenced = *d.referenced.get_mut();
            *d.referenced.get_mut() = false;
            was_referenced
        };

        if referenced {
            if self.can_promote(idx) {
                let epoch = self.next_epoch();
                {
                    let (d, _) = self.entries.get_mut(idx).unwrap();
                    d.status = Status::Hot;
                    d.epoch = epoch;
                }
                self.entries
                    .relink_at(idx, &mut self.cold_head, &mut self.hot_head);
                self.size_cold -= 1;
                self.size_hot += 1;
                #[cfg(feature = "logging")]
                log::trace!("promoted cold descriptor {idx:?} to hot");
            } else {
                let epoch = self.next_epoch();
                let (d, _) = self.entries.get_mut(idx).unwrap();
                d.epoch = epoch;
                self.entries.requeue_at(idx, &mut self.cold_head);
            }
            return;
        }

        let in_test = {
            let (d, _) = self.entries.get(idx).unwrap();
            self.in_test_period(d)
        };
        if in_test {
            {
                let (d, _) = self.entries.get_mut(idx).unwrap();
                d.status = Status::NonResident;
            }
            self.entries
                .relink_at(idx, &mut self.cold_head, &mut self.non_resident_head);
            self.size_cold -= 1;
            self.size_non_resident += 1;
            while self.size_non_resident > self.max_size {
                self.scan_non_resident();
            }
        } else {
            self.size_cold -= 1;
            let mut head = self.cold_head;
            self.remove_entry(idx, &mut head);
            self.cold_head = head;
        }
    }

    /// Walks HOT from the oldest candidate, never past a descriptor whose
    /// epoch exceeds `epoch_bound`. Returns whether a demotion happened.
    fn scan_hot(&mut self, epoch_bound: u64) -> bool {
        if self.size_hot == 0 {
            return false;
        }
        let mut steps = 0usize;
        loop {
            let idx = self.hot_head.unwrap();
            let current_epoch = self.entries.get(idx).unwrap().0.epoch;
            if current_epoch > epoch_bound {
                return false;
            }
            let referenced = {
                let (d, _) = self.entries.get_mut(idx).unwrap();
                let was_referenced = *d.referenced.get_mut();
                *d.referenced.get_mut() = false;
                was_referenced
            };
            if referenced {
                let epoch = self.next_epoch();
                {
                    let (d, _) = self.entries.get_mut(idx).unwrap();
                    d.epoch = epoch;
                }
                self.entries.requeue_at(idx, &mut self.hot_head);
                steps += 1;
                if steps >= self.size_hot {
                    return false;
                }
                continue;
            }
            {
                let (d, _) = self.entries.get_mut(idx).unwrap();
                d.status = Status::Cold;
            }
            self.entries
                .relink_at(idx, &mut self.hot_head, &mut self.cold_head);
            self.size_hot -= 1;
            self.size_cold += 1;
            #[cfg(feature = "logging")]
            log::trace!("demoted hot descriptor {idx:?} to cold");
            return true;
        }
    }

    /// A promotion attempt during the test period widens `cold_target`,
    /// possibly demoting hot descriptors to make room, then re-checks that
    /// the candidate is still within its test period.
    fn can_promote(&mut self, idx: Token) -> bool {
        {
            let (d, _) = self.entries.get(idx).unwrap();
            if !self.in_test_period(d) {
                return false;
            }
        }
        self.controller.grow();
        while self.size_hot > 0
            && self.size_hot >= self.max_size.saturating_sub(self.controller.cold_target())
        {
            let candidate_epoch = self.entries.get(idx).unwrap().0.epoch;
            if !self.scan_hot(candidate_epoch) {
                return false;
            }
        }
        let (d, _) = self.entries.get(idx).unwrap();
        self.in_test_period(d)
    }

    fn scan_non_resident(&mut self) {
        debug_assert!(self.size_non_resident > 0);
        let idx = self.non_resident_head.unwrap();
        self.size_non_resident -= 1;
        let mut head = self.non_resident_head;
        self.remove_entry(idx, &mut head);
        self.non_resident_head = head;
        self.controller.shrink();
        #[cfg(feature = "logging")]
        log::trace!("expired ghost descriptor {idx:?}");
    }

    fn prune(&mut self) {
        while let Some(idx) = self.non_resident_head {
            let expired = {
                let (d, _) = self.entries.get(idx).unwrap();
                !self.in_test_period(d)
            };
            if !expired {
                break;
            }
            self.scan_non_resident();
        }
        while self.size_non_resident > self.max_size {
            self.scan_non_resident();
        }
    }
}

impl<K: Eq + Hash, S: BuildHasher> Policy<K> for EpochPolicy<K, S> {
    fn record(&mut self, key: K) {
        self.stats.record_operation();
        let hash = self.hash(&key);
        if let Some(idx) = self.search(hash, &key) {
            let status = self.entries.get(idx).unwrap().0.status;
            match status {
                Status::Hot | Status::Cold => {
                    let (d, _) = self.entries.get_mut(idx).unwrap();
                    *d.referenced.get_mut() = true;
                    self.stats.record_hit();
                }
                Status::NonResident => {
                    self.stats.record_miss();
                    self.refault(idx);
                }
            }
            return;
        }
        self.stats.record_miss();
        self.insert_new(key, hash);
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Integrity assertions equivalent to §3's invariants; a no-op in
    /// release builds.
    fn finished(&self) {
        debug_assert!(
            self.size_hot + self.size_cold <= self.max_size,
            "resident population exceeds maximum_size"
        );
        debug_assert!(
            self.size_non_resident <= self.max_size,
            "non-resident population exceeds maximum_size"
        );
        debug_assert!(self.controller.cold_target() >= self.controller.min_cold());
        debug_assert!(self.controller.cold_target() <= self.controller.max_cold());
        if let Some(idx) = self.non_resident_head {
            let (d, _) = self.entries.get(idx).unwrap();
            debug_assert!(
                self.in_test_period(d),
                "non-resident head violates the test-period invariant"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_size: usize) -> EpochPolicy<i64> {
        EpochPolicy::new(Config::new(max_size)).unwrap()
    }

    #[test]
    fn warm_up_splits_hot_and_cold() {
        let mut p = policy(3);
        for k in [1, 2, 3] {
            p.record(k);
        }
        let snap = p.stats();
        assert_eq!(snap.misses, 3);
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.evictions, 0);
        assert_eq!(p.size_hot, 2);
        assert_eq!(p.size_cold, 1);
        assert_eq!(p.size_non_resident, 0);
        p.finished();
    }

    #[test]
    fn repeated_hit_is_idempotent() {
        let mut p = policy(3);
        for k in [1, 2, 3] {
            p.record(k);
        }
        let before = (p.size_hot, p.size_cold, p.size_non_resident);
        p.record(1);
        p.record(1);
        p.record(1);
        let after = (p.size_hot, p.size_cold, p.size_non_resident);
        assert_eq!(before, after);
        assert_eq!(p.stats().hits, 3);
    }

    #[test]
    fn hot_promotion_on_reaccess() {
        let mut p = policy(3);
        for k in [1, 2, 3] {
            p.record(k);
        }
        for _ in 0..3 {
            p.record(1);
        }
        let snap = p.stats();
        assert_eq!(snap.misses, 3);
        assert_eq!(snap.hits, 3);
        assert_eq!(p.size_non_resident, 0);
    }

    #[test]
    fn ghost_cap_never_exceeds_max_size() {
        let mut p = policy(4);
        let mut key = 0i64;
        for _ in 0..500 {
            p.record(key % 37);
            key += 1;
            assert!(p.size_non_resident <= p.capacity());
            p.finished();
        }
    }

    #[test]
    fn refault_on_expired_ghost_is_a_fresh_cold_miss() {
        // A tiny cache where the cold descriptor is evicted (and its test
        // period allowed to expire) before being re-accessed must treat the
        // re-access as a brand new miss, not a promotion.
        //
        // Warm-up (maxSize=2, minCold=1) admits key 1 as hot and key 2 as
        // cold; key 3 then evicts the only cold resident, key 2, as a ghost.
        let mut p = policy(2);
        p.record(1);
        p.record(2);
        p.record(3); // evicts key 2 as cold (still in test) -> becomes a ghost
        assert_eq!(p.size_non_resident, 1);
        p.record(2); // re-fault: promotion is attempted, may or may not land
        let snap = p.stats();
        assert_eq!(snap.misses, 4);
        p.finished();
    }
}
