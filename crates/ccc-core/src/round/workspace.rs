//! Per-round slot tracking.
//!
//! One `RoundWorkspace` records what happened in every radio slot of the
//! current round. Each slot is one-shot: `Reset` is the only initial
//! state and the first terminal outcome written wins.

use crate::protocol::constants::{FIRST_RESPONDER_SLOT, MAX_NB_RESPONDERS, MAX_NB_SLOT};
use crate::protocol::frames::ResponderRecord;

/// Terminal outcome of one radio slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotOutcome {
    /// Slot not yet used this round.
    #[default]
    Reset,
    TxOk,
    TxLate,
    RxOk,
    RxLate,
    RxTimeout,
    RxErr,
    /// SP0 decode or MIC failure.
    RxSp0Err,
    /// SP3 ranging frame rejected.
    RxSp3Reject,
    /// Frame filter rejected the sender.
    RxFilterReject,
}

impl SlotOutcome {
    /// Wire/report code for this outcome.
    pub fn code(self) -> u8 {
        match self {
            SlotOutcome::Reset => 0,
            SlotOutcome::TxOk => 1,
            SlotOutcome::TxLate => 2,
            SlotOutcome::RxOk => 3,
            SlotOutcome::RxLate => 4,
            SlotOutcome::RxTimeout => 5,
            SlotOutcome::RxErr => 6,
            SlotOutcome::RxSp0Err => 7,
            SlotOutcome::RxSp3Reject => 8,
            SlotOutcome::RxFilterReject => 9,
        }
    }

    /// Every outcome except `Reset` is terminal for the round.
    pub fn is_terminal(self) -> bool {
        self != SlotOutcome::Reset
    }

    pub fn is_tx(self) -> bool {
        matches!(self, SlotOutcome::TxOk | SlotOutcome::TxLate)
    }
}

/// One slot's recorded radio result.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotRecord {
    pub timestamp: u64,
    pub sts_quality: u16,
    pub sts_status: u16,
    pub outcome: SlotOutcome,
}

/// Slot map for one ranging round with `n` responders:
/// slot 0 PrePoll TX, slot 1 Poll TX, slots 2..2+n responder RX,
/// slot 2+n Final TX, slot 3+n FinalData TX.
#[derive(Debug)]
pub struct RoundWorkspace {
    slots: [SlotRecord; MAX_NB_SLOT],
    n_responders: u8,
    pub block_index: u16,
    pub round_index: u16,
    pub rounds_per_block: u8,
}

impl RoundWorkspace {
    pub fn new(n_responders: u8, rounds_per_block: u8) -> Self {
        debug_assert!(n_responders as usize <= MAX_NB_RESPONDERS);
        Self {
            slots: [SlotRecord::default(); MAX_NB_SLOT],
            n_responders,
            block_index: 0,
            round_index: 0,
            rounds_per_block,
        }
    }

    /// Number of slots a round with this responder count occupies.
    pub fn slots_in_use(&self) -> usize {
        FIRST_RESPONDER_SLOT + self.n_responders as usize + 2
    }

    /// Responder RX slot indices.
    pub fn responder_slots(&self) -> std::ops::Range<usize> {
        FIRST_RESPONDER_SLOT..FIRST_RESPONDER_SLOT + self.n_responders as usize
    }

    /// Zero every slot and bind the workspace to the given round.
    /// Called exactly once at round entry.
    pub fn reset_for_new_round(&mut self, block_index: u16, round_index: u16) {
        self.slots = [SlotRecord::default(); MAX_NB_SLOT];
        self.block_index = block_index;
        self.round_index = round_index;
    }

    /// Record a transmit result. Interrupt context; never blocks,
    /// never overwrites a terminal slot.
    pub fn record_tx_result(&mut self, slot_idx: usize, timestamp: u64, outcome: SlotOutcome) {
        if slot_idx >= MAX_NB_SLOT || self.slots[slot_idx].outcome.is_terminal() {
            return;
        }
        self.slots[slot_idx] = SlotRecord {
            timestamp,
            sts_quality: 0,
            sts_status: 0,
            outcome,
        };
    }

    /// Record a receive result. Interrupt context; never blocks,
    /// never overwrites a terminal slot.
    pub fn record_rx_result(
        &mut self,
        slot_idx: usize,
        timestamp: u64,
        sts_quality: u16,
        sts_status: u16,
        outcome: SlotOutcome,
    ) {
        if slot_idx >= MAX_NB_SLOT || self.slots[slot_idx].outcome.is_terminal() {
            return;
        }
        self.slots[slot_idx] = SlotRecord {
            timestamp,
            sts_quality,
            sts_status,
            outcome,
        };
    }

    pub fn slot(&self, slot_idx: usize) -> Option<&SlotRecord> {
        self.slots.get(slot_idx)
    }

    /// Count responder slots that ended in `RxOk`.
    pub fn count_successful_responses(&self) -> u8 {
        self.responder_slots()
            .filter(|&i| self.slots[i].outcome == SlotOutcome::RxOk)
            .count() as u8
    }

    /// Abandon the rest of the round: every unfilled RX slot becomes
    /// `RxTimeout`, every unfilled TX slot becomes `TxLate`. After this
    /// the round completes through the normal path.
    pub fn abandon_remaining(&mut self) {
        let resp = self.responder_slots();
        for idx in 0..self.slots_in_use() {
            if self.slots[idx].outcome.is_terminal() {
                continue;
            }
            self.slots[idx].outcome = if resp.contains(&idx) {
                SlotOutcome::RxTimeout
            } else {
                SlotOutcome::TxLate
            };
        }
    }

    /// FinalData records for every responder that answered, node index
    /// relative to the first responder slot. STS status words wider than
    /// a byte saturate at the wire limit.
    pub fn responder_records(&self) -> Vec<ResponderRecord> {
        self.responder_slots()
            .filter(|&i| self.slots[i].outcome == SlotOutcome::RxOk)
            .map(|i| {
                let rec = &self.slots[i];
                ResponderRecord {
                    node_index: (i - FIRST_RESPONDER_SLOT) as u8,
                    timestamp: rec.timestamp as u32,
                    uncertainty: (rec.sts_quality >> 8) as u8,
                    status: rec.sts_status.min(u8::MAX as u16) as u8,
                }
            })
            .collect()
    }

    /// Per-outcome counters for this round, indexed by outcome code.
    pub fn outcome_histogram(&self) -> [u8; 10] {
        let mut hist = [0u8; 10];
        for slot in &self.slots[..self.slots_in_use()] {
            hist[slot.outcome.code() as usize] += 1;
        }
        hist
    }
}
