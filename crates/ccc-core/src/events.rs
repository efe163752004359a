//! Event system for host-stack decoupling.
//!
//! The UCI/management layer subscribes to session and round events
//! without tight coupling to the engine internals.

use crate::session::{RangingStats, SessionState};

/// Events emitted by a ranging session.
#[derive(Debug, Clone)]
pub enum RangingEvent {
    /// Session lifecycle transition.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// Session-scoped keys derived, first round keys staged.
    SessionStarted { session_id: u32, sts_index0: u32 },
    /// A round finished (normally or abandoned).
    RoundCompleted {
        block_index: u16,
        round_index: u16,
        good_rx: u8,
        hopped: bool,
    },
    /// Hop index chosen for the next block.
    HopDecision { block_index: u16, hop_index: u8 },
    /// Round keys precomputed ahead of time.
    KdfPrecomputed { sts_index: u32 },
    /// Aggregate statistics after a round.
    StatsUpdated { stats: RangingStats },
    /// Non-fatal engine error, absorbed per round.
    Error { message: String },
}

/// Observer trait for receiving ranging events.
///
/// Implement this in the host stack to receive updates.
pub trait RangingObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &RangingEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl RangingObserver for NullObserver {
    fn on_event(&self, _event: &RangingEvent) {
        // Do nothing
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl RangingObserver for TracingObserver {
    fn on_event(&self, event: &RangingEvent) {
        match event {
            RangingEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Session state changed");
            }
            RangingEvent::SessionStarted {
                session_id,
                sts_index0,
            } => {
                tracing::info!(
                    session_id = %format!("{:08X}", session_id),
                    sts_index0 = sts_index0,
                    "Session started"
                );
            }
            RangingEvent::RoundCompleted {
                block_index,
                round_index,
                good_rx,
                hopped,
            } => {
                tracing::info!(
                    block = block_index,
                    round = round_index,
                    good_rx = good_rx,
                    hopped = hopped,
                    "Round complete"
                );
            }
            RangingEvent::HopDecision {
                block_index,
                hop_index,
            } => {
                tracing::info!(block = block_index, hop_index = hop_index, "Hop decided");
            }
            RangingEvent::KdfPrecomputed { sts_index } => {
                tracing::debug!(sts_index = sts_index, "Round keys precomputed");
            }
            RangingEvent::StatsUpdated { stats } => {
                tracing::debug!(
                    rounds = stats.rounds_completed,
                    failed = stats.rounds_failed,
                    rx_ok = stats.rx_ok,
                    "Stats updated"
                );
            }
            RangingEvent::Error { message } => {
                tracing::error!("{}", message);
            }
        }
    }
}
