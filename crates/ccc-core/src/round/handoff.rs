//! Interrupt-to-round-context handoff.
//!
//! Single producer (the radio event handler) pushes slot results with a
//! non-blocking `try_send`; the single consumer (round processing)
//! drains them at the round-complete barrier, optionally blocking until
//! the round's time budget runs out. Events that do not fit are dropped
//! and counted — the interrupt side must never stall on slot timing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

use crate::round::workspace::{RoundWorkspace, SlotOutcome};

/// One radio slot result, as delivered by the driver interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEvent {
    pub slot_index: u8,
    pub timestamp: u64,
    pub sts_quality: u16,
    pub sts_status: u16,
    pub outcome: SlotOutcome,
}

impl SlotEvent {
    pub fn tx(slot_index: u8, timestamp: u64, outcome: SlotOutcome) -> Self {
        Self {
            slot_index,
            timestamp,
            sts_quality: 0,
            sts_status: 0,
            outcome,
        }
    }

    pub fn rx(
        slot_index: u8,
        timestamp: u64,
        sts_quality: u16,
        sts_status: u16,
        outcome: SlotOutcome,
    ) -> Self {
        Self {
            slot_index,
            timestamp,
            sts_quality,
            sts_status,
            outcome,
        }
    }

    /// Apply this event to the workspace, honoring the one-shot slot rule.
    pub fn apply(&self, workspace: &mut RoundWorkspace) {
        if self.outcome.is_tx() {
            workspace.record_tx_result(self.slot_index as usize, self.timestamp, self.outcome);
        } else {
            workspace.record_rx_result(
                self.slot_index as usize,
                self.timestamp,
                self.sts_quality,
                self.sts_status,
                self.outcome,
            );
        }
    }
}

/// Interrupt-side handle. `try_send` only; full or disconnected queues
/// drop the event and bump the counter.
#[derive(Clone)]
pub struct SlotEventSender {
    tx: SyncSender<SlotEvent>,
    dropped: Arc<AtomicU32>,
}

impl SlotEventSender {
    /// Push an event without blocking. Returns false if it was dropped.
    pub fn try_send(&self, event: SlotEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Events dropped since the channel was created.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Round-processing-side handle.
pub struct SlotEventReceiver {
    rx: Receiver<SlotEvent>,
    dropped: Arc<AtomicU32>,
}

impl SlotEventReceiver {
    /// Wait for the next event up to the round's remaining time budget.
    pub fn recv_deadline(&self, budget: Duration) -> Option<SlotEvent> {
        match self.rx.recv_timeout(budget) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Apply every already-queued event to the workspace without
    /// blocking. Returns how many were applied. This is the barrier
    /// between "round slots open" and "round complete".
    pub fn drain_into(&self, workspace: &mut RoundWorkspace) -> usize {
        let mut applied = 0;
        while let Ok(ev) = self.rx.try_recv() {
            ev.apply(workspace);
            applied += 1;
        }
        applied
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded SPSC slot-event channel.
pub fn slot_event_channel(capacity: usize) -> (SlotEventSender, SlotEventReceiver) {
    let (tx, rx) = sync_channel(capacity);
    let dropped = Arc::new(AtomicU32::new(0));
    (
        SlotEventSender {
            tx,
            dropped: dropped.clone(),
        },
        SlotEventReceiver { rx, dropped },
    )
}
