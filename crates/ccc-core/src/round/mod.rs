//! Round-scoped state: slot tracking, key double-buffering, hop
//! decisions and the interrupt handoff channel.

pub mod handoff;
pub mod hop;
pub mod keys;
pub mod workspace;

pub use handoff::{slot_event_channel, SlotEvent, SlotEventReceiver, SlotEventSender};
pub use hop::{calc_aes_hop_si, calc_hop_index, calc_hop_si, evaluate_hop_criterion, HopMode};
pub use keys::{RoundKeyRing, RoundKeys, NEXT_KDF_BLK, PRECALC_KDF_BLK};
pub use workspace::{RoundWorkspace, SlotOutcome, SlotRecord};
