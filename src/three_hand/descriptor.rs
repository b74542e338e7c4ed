use std::sync::atomic::AtomicBool;

/// Which of the three populations a descriptor currently belongs to. All
/// three statuses live in the same unified ring for this variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Hot,
    Cold,
    NonResident,
}

/// One per key observed by a [`super::ThreeHandPolicy`], until pruned.
///
/// `in_test` is the explicit probation flag the three-hand variant uses in
/// place of the epoch variant's monotonic counter: true while a COLD or
/// NON_RESIDENT descriptor is still within its test period, consumed by the
/// test hand as it sweeps past.
#[derive(Debug)]
pub struct Descriptor<K> {
    pub key: K,
    pub status: Status,
    pub referenced: AtomicBool,
    pub in_test: bool,
}
