//! CCC-Core: secure ranging engine for the CCC UWB protocol.
//!
//! This crate implements the ranging-round cryptographic and slot-state
//! engine used between one Initiator and up to ten Responders: the key
//! derivation cascade from the session URSK down to per-round keys, the
//! SP0 frame codec with CCM* protection, per-slot outcome tracking, and
//! the frequency-hop decision linking one round's outcome to the next
//! round's keys and channel.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: wire constants, SP0 frame structures, AEAD codec
//! - **Crypto**: AES-CMAC key-derivation cascade, CCM* wrapper
//! - **Round**: slot/workspace tracker, key double-buffering, hop logic,
//!   interrupt handoff channel
//! - **Session**: lifecycle controller and configuration
//! - **Events**: observer pattern for host-stack decoupling
//!
//! The OSAL, radio driver, MAC scheduler and UCI transport are external
//! collaborators; this engine is synchronous, non-blocking and owns no
//! global state.
//!
//! # Example
//!
//! ```no_run
//! use ccc_core::session::{RangingSession, SessionConfig};
//!
//! let cfg = SessionConfig {
//!     session_id: 0x1234_5678,
//!     n_responders: 5,
//!     ..Default::default()
//! };
//!
//! let mut session = RangingSession::new(cfg, [0u8; 32]).expect("config");
//! session.start().expect("session start");
//! session.begin_round().expect("round entry");
//! let prepoll = session.next_prepoll().expect("frame");
//! // hand `prepoll` to the MAC scheduler for slot 0...
//! ```

pub mod crypto;
pub mod events;
pub mod protocol;
pub mod round;
pub mod session;

// Re-exports for convenience
pub use crypto::{CryptoError, Key128, Key256};
pub use events::{NullObserver, RangingEvent, RangingObserver, TracingObserver};
pub use protocol::{CodecError, FinalData, FrameKeys, MacHeader, PrePoll, Sp0Message};
pub use round::{
    slot_event_channel, HopMode, RoundKeyRing, RoundKeys, RoundWorkspace, SlotEvent, SlotOutcome,
};
pub use session::{
    ConfigError, RangingSession, RangingStats, SessionConfig, SessionError, SessionState,
    StsIndexPolicy,
};
