//! Double-buffered round key material.
//!
//! One slot holds the keys the next round will use; the other may hold
//! keys precomputed one round further ahead (hopping can place two
//! rounds back-to-back, leaving no time to derive between them). The
//! slot in use is fixed before a round opens and never changes while
//! its slots are live, which is what makes lock-free reads from the
//! interrupt path safe.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::Key128;

/// Buffer slot for the upcoming round.
pub const NEXT_KDF_BLK: usize = 0;
/// Buffer slot for the round after, filled opportunistically.
pub const PRECALC_KDF_BLK: usize = 1;

/// One round's derived key pair, tagged with the STS index it was
/// derived for.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct RoundKeys {
    pub d_ursk: Key128,
    pub d_udsk: Key128,
    pub sts_index: u32,
}

/// Two-slot ring holding current and precomputed round keys.
///
/// Exactly one slot is current; the other is valid only while `ready`
/// is set, so stale material can never be promoted by accident.
#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct RoundKeyRing {
    slots: [RoundKeys; 2],
    current: usize,
    ready: bool,
}

impl RoundKeyRing {
    /// Start the ring with the first round's keys in `NEXT_KDF_BLK`.
    pub fn new(first: RoundKeys) -> Self {
        let empty = RoundKeys {
            d_ursk: [0u8; 16],
            d_udsk: [0u8; 16],
            sts_index: 0,
        };
        Self {
            slots: [first, empty],
            current: NEXT_KDF_BLK,
            ready: false,
        }
    }

    /// Keys for the round about to run (or running).
    pub fn current(&self) -> &RoundKeys {
        &self.slots[self.current]
    }

    /// Precomputed keys for the following round, if any.
    pub fn precalc(&self) -> Option<&RoundKeys> {
        self.ready.then(|| &self.slots[self.current ^ 1])
    }

    /// Whether precomputed material exists (`b_kdf_rdy`).
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Store keys for the anticipated round into the spare slot.
    pub fn store_precalc(&mut self, keys: RoundKeys) {
        self.slots[self.current ^ 1] = keys;
        self.ready = true;
    }

    /// Promote the precomputed slot to current. Returns false (and
    /// leaves the ring untouched) when nothing was precomputed.
    pub fn advance(&mut self) -> bool {
        if !self.ready {
            return false;
        }
        self.current ^= 1;
        self.ready = false;
        true
    }

    /// Drop any precomputed material (parameters changed under us).
    pub fn invalidate_precalc(&mut self) {
        self.slots[self.current ^ 1].zeroize();
        self.ready = false;
    }

    /// Replace the current slot outright, discarding precomputed
    /// material. Used at session start and recovery.
    pub fn reset(&mut self, first: RoundKeys) {
        self.slots[self.current].zeroize();
        self.slots[self.current] = first;
        self.invalidate_precalc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(tag: u8, sts_index: u32) -> RoundKeys {
        RoundKeys {
            d_ursk: [tag; 16],
            d_udsk: [tag ^ 0xFF; 16],
            sts_index,
        }
    }

    #[test]
    fn test_new_ring_not_ready() {
        let ring = RoundKeyRing::new(keys(1, 100));
        assert!(!ring.is_ready());
        assert!(ring.precalc().is_none());
        assert_eq!(ring.current().sts_index, 100);
    }

    #[test]
    fn test_store_then_advance() {
        let mut ring = RoundKeyRing::new(keys(1, 100));
        ring.store_precalc(keys(2, 101));
        assert!(ring.is_ready());
        assert_eq!(ring.precalc().unwrap().sts_index, 101);
        // Current is untouched until advance.
        assert_eq!(ring.current().sts_index, 100);

        assert!(ring.advance());
        assert_eq!(ring.current().sts_index, 101);
        assert!(!ring.is_ready());
        assert!(ring.precalc().is_none());
    }

    #[test]
    fn test_advance_without_precalc_is_noop() {
        let mut ring = RoundKeyRing::new(keys(1, 100));
        assert!(!ring.advance());
        assert_eq!(ring.current().sts_index, 100);
    }

    #[test]
    fn test_invalidate_precalc() {
        let mut ring = RoundKeyRing::new(keys(1, 100));
        ring.store_precalc(keys(2, 101));
        ring.invalidate_precalc();
        assert!(!ring.advance());
        assert_eq!(ring.current().sts_index, 100);
    }

    #[test]
    fn test_reset_discards_both_slots() {
        let mut ring = RoundKeyRing::new(keys(1, 100));
        ring.store_precalc(keys(2, 101));
        ring.reset(keys(3, 500));
        assert_eq!(ring.current().sts_index, 500);
        assert!(!ring.is_ready());
    }
}
