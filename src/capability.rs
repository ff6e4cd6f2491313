//! Capability-based authorization (spec §4.2, §4.6, §9).
//!
//! Two distinct shapes appear in the spec: a fixed-size bitset gating the
//! notification service's four methods, and an ordered set of
//! `(subject, verb, object)` UUID triples gating the protocol service's
//! extended-API requests. UUID comparisons that happen on the handshake's
//! secret surface use `subtle`'s constant-time equality per spec §9.

use std::collections::BTreeSet;

use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Notification-service capability bits, indexed by method. A fresh
/// instance starts with every bit set (full capability) and is narrowed by
/// `REDUCE_CAPS`; capabilities are never re-granted, only reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyCapSet(u32);

pub mod notify_cap {
    pub const REDUCE_CAPS: u32 = 1 << 0;
    pub const BLOCK_UPDATE: u32 = 1 << 1;
    pub const BLOCK_ASSERTION: u32 = 1 << 2;
    pub const BLOCK_ASSERTION_CANCEL: u32 = 1 << 3;
}

impl NotifyCapSet {
    pub fn full() -> Self {
        Self(
            notify_cap::REDUCE_CAPS
                | notify_cap::BLOCK_UPDATE
                | notify_cap::BLOCK_ASSERTION
                | notify_cap::BLOCK_ASSERTION_CANCEL,
        )
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// `REDUCE_CAPS` semantics: intersect, never union, so a reduction can
    /// only narrow what an instance is permitted to do.
    pub fn reduce(&mut self, payload_bits: u32) {
        self.0 &= payload_bits;
    }
}

/// A `(subject, verb, object)` authorization triple for the protocol
/// service's extended-API capability model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CapabilityTriple {
    pub subject: Uuid,
    pub verb: Uuid,
    pub object: Uuid,
}

impl CapabilityTriple {
    pub fn new(subject: Uuid, verb: Uuid, object: Uuid) -> Self {
        Self { subject, verb, object }
    }
}

/// An ordered set of capability triples belonging to one authorized entity.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    triples: BTreeSet<CapabilityTriple>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, triple: CapabilityTriple) {
        self.triples.insert(triple);
    }

    /// Exact-match membership test. Callers on the handshake-time lookup
    /// path should additionally use `uuid_eq` for the entity-identification
    /// step, since that comparison sits on a secret surface.
    pub fn contains(&self, subject: Uuid, verb: Uuid, object: Uuid) -> bool {
        self.triples.contains(&CapabilityTriple::new(subject, verb, object))
    }
}

/// Constant-time UUID equality, used where the comparison is against a
/// secret value (e.g. handshake-time entity lookup) rather than a public
/// routing key.
pub fn uuid_eq(a: &Uuid, b: &Uuid) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_caps_only_narrows() {
        let mut caps = NotifyCapSet::full();
        assert!(caps.has(notify_cap::BLOCK_ASSERTION));
        caps.reduce(!notify_cap::BLOCK_ASSERTION);
        assert!(!caps.has(notify_cap::BLOCK_ASSERTION));
        // a later reduce cannot re-grant the bit
        caps.reduce(u32::MAX);
        assert!(!caps.has(notify_cap::BLOCK_ASSERTION));
    }

    #[test]
    fn capability_set_exact_match_only() {
        let mut set = CapabilitySet::new();
        let (s, v, o) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        set.insert(CapabilityTriple::new(s, v, o));
        assert!(set.contains(s, v, o));
        assert!(!set.contains(s, v, Uuid::new_v4()));
    }

    #[test]
    fn uuid_eq_matches_standard_equality() {
        let a = Uuid::new_v4();
        let b = a;
        let c = Uuid::new_v4();
        assert!(uuid_eq(&a, &b));
        assert!(!uuid_eq(&a, &c) || a == c);
    }
}
