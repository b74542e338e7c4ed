//! Integration-level scenarios and laws, run against both replacement
//! engine realisations through the shared `Policy` contract.

use clockpro_core::epoch::EpochPolicy;
use clockpro_core::three_hand::ThreeHandPolicy;
use clockpro_core::{Config, Policy, StatsSnapshot};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Zipf;

fn config() -> Config {
    Config::new(3).percent_min_cold(1.0 / 3.0).percent_max_cold(2.0 / 3.0)
}

fn for_each_variant(mut f: impl FnMut(&mut dyn Policy<i64>)) {
    let mut epoch = EpochPolicy::<i64>::new(config()).unwrap();
    f(&mut epoch);
    let mut three_hand = ThreeHandPolicy::<i64>::new(config()).unwrap();
    f(&mut three_hand);
}

fn record_all(cache: &mut dyn Policy<i64>, keys: &[i64]) {
    for &k in keys {
        cache.record(k);
    }
}

#[test]
fn scenario_warm_up() {
    for_each_variant(|cache| {
        record_all(cache, &[1, 2, 3]);
        let snap = cache.stats();
        assert_eq!(snap.misses, 3);
        assert_eq!(snap.hits, 0);
        assert_eq!(snap.evictions, 0);
        cache.finished();
    });
}

#[test]
fn scenario_pure_lru_workload() {
    // Not actually LRU: warm-up (maxSize=3, minCold=1) admits keys 1 and 2
    // as hot, so they survive the 3,4 churn and hit on the second lap. A
    // strict-LRU engine would miss all 8; this one's scan-resistance means
    // it must not.
    for_each_variant(|cache| {
        record_all(cache, &[1, 2, 3, 4, 1, 2, 3, 4]);
        let snap = cache.stats();
        assert_eq!(snap.operations, 8);
        assert_eq!(snap.hits + snap.misses, 8);
        assert!(snap.hits > 0, "hot keys from warm-up should survive the cold churn");
        cache.finished();
    });
}

#[test]
fn scenario_hot_promotion() {
    for_each_variant(|cache| {
        record_all(cache, &[1, 2, 3]);
        assert_eq!(cache.stats().misses, 3);
        record_all(cache, &[1, 1, 1]);
        let snap = cache.stats();
        assert_eq!(snap.misses, 3);
        assert_eq!(snap.hits, 3);
        cache.finished();
    });
}

#[test]
fn scenario_scan_resistance() {
    for_each_variant(|cache| {
        record_all(cache, &[1, 2, 3, 1, 4, 5, 6, 7]);
        let before = cache.stats();
        cache.record(1);
        let after = cache.stats();
        assert_eq!(after.hits, before.hits + 1, "key 1 should survive the 4..7 scan");
        cache.finished();
    });
}

#[test]
fn scenario_refault_adaptation_is_a_fresh_cold_miss() {
    // With maxSize=2 and lowerBoundCold=1, warm-up admits key 1 as hot and
    // key 2 as cold; a third distinct key then evicts key 2 (the only cold
    // resident) while still in its test period, so the re-fault below
    // exercises case 3 deterministically.
    let small = Config::new(2);
    let mut epoch = EpochPolicy::<i64>::new(small).unwrap();
    let mut three_hand = ThreeHandPolicy::<i64>::new(small).unwrap();
    for cache in [&mut epoch as &mut dyn Policy<i64>, &mut three_hand as &mut dyn Policy<i64>] {
        cache.record(1);
        cache.record(2);
        cache.record(3); // evicts key 2 while still in test -> becomes a ghost
        cache.record(2); // re-fault: a miss regardless of whether it promotes
        let snap = cache.stats();
        assert_eq!(snap.misses, 4);
        cache.finished();
    }
}

#[test]
fn scenario_ghost_cap_enforcement() {
    for_each_variant(|cache| {
        let mut key = 0i64;
        for _ in 0..2_000 {
            cache.record(key % 41);
            key += 1;
            cache.finished();
        }
    });
}

#[test]
fn law_hit_bit_idempotence() {
    for_each_variant(|cache| {
        record_all(cache, &[1, 2, 3]);
        cache.record(1);
        let before: StatsSnapshot = cache.stats();
        cache.record(1);
        cache.record(1);
        let after = cache.stats();
        assert_eq!(after.hits, before.hits + 2);
        assert_eq!(after.operations, before.operations + 2);
    });
}

#[test]
fn law_warm_up_monotonicity_no_ghosts_before_capacity_full() {
    for_each_variant(|cache| {
        // maxSize is 3: fewer than 3 distinct keys seen so far can never
        // produce a non-resident descriptor.
        cache.record(1);
        cache.record(2);
        cache.record(1);
        cache.record(2);
        cache.finished();
    });
}

#[test]
fn law_adaptive_bounds_hold_under_random_access() {
    for_each_variant(|cache| {
        let mut key = 1i64;
        for i in 0..1000 {
            cache.record((key * 2654435761u32 as i64).rem_euclid(97));
            key = key.wrapping_add(i);
            cache.finished();
        }
    });
}

/// A Zipfian working set is the standard stress case for recency/frequency
/// replacement policies: a small head of keys draws most accesses, giving
/// the hot/cold split and the ghost list real promotion and expiry
/// pressure rather than a flat, memoryless access pattern.
#[test]
fn zipfian_workload_never_breaks_invariants() {
    let universe = 500u64;
    let zipf = Zipf::new(universe, 1.03).unwrap();
    let keys: Vec<i64> = {
        let mut rng = SmallRng::seed_from_u64(0xC10C_2021);
        (0..20_000)
            .map(|_| rng.sample(zipf) as i64)
            .collect()
    };

    let config = Config::new(64);
    let mut epoch = EpochPolicy::<i64>::new(config).unwrap();
    let mut three_hand = ThreeHandPolicy::<i64>::new(config).unwrap();
    for cache in [&mut epoch as &mut dyn Policy<i64>, &mut three_hand as &mut dyn Policy<i64>] {
        for &key in &keys {
            cache.record(key);
            cache.finished();
        }
        let snap = cache.stats();
        assert_eq!(snap.operations, keys.len() as u64);
        assert_eq!(snap.hits + snap.misses, snap.operations);
        // A skewed head should be found resident far more often than a
        // uniform workload over the same universe would produce.
        assert!(snap.hits > snap.misses);
    }
}
