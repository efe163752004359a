//! Session lifecycle controller.
//!
//! Owns the per-session configuration and every piece of derived key
//! material, drives round start/completion, and keeps the round key
//! ring one derivation ahead so back-to-back hopped rounds never wait
//! on the KDF.

pub mod config;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::kdf::{
    derive_mupsk, derive_mursk, derive_round_keys, derive_salt, derive_salted_hash, derive_uad,
};
use crate::crypto::{CryptoError, Key128, Key256};
use crate::events::{NullObserver, RangingEvent, RangingObserver, TracingObserver};
use crate::protocol::codec::{
    build_finaldata, build_prepoll, decrypt_frame, CodecError, FrameKeys, Sp0Message,
};
use crate::protocol::frames::{FinalData, PrePoll};
use crate::round::handoff::SlotEventReceiver;
use crate::round::hop::{calc_hop_index, evaluate_hop_criterion};
use crate::round::keys::{RoundKeyRing, RoundKeys};
use crate::round::workspace::{RoundWorkspace, SlotOutcome};

pub use config::{ConfigError, SessionConfig, StsIndexPolicy};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No round activity; key material may or may not exist yet.
    Suspended,
    /// Rounds are running.
    Active,
    /// Session parameters changed; keys being re-derived.
    Recovering,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Suspended => write!(f, "SUSPENDED"),
            SessionState::Active => write!(f, "ACTIVE"),
            SessionState::Recovering => write!(f, "RECOVERING"),
        }
    }
}

/// Session-scoped key material, derived once per session (or recovery)
/// and immutable until the next recovery.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKeys {
    mursk: Key256,
    mupsk1: Key128,
    mupsk2: Key256,
    salt: Key128,
    salted_hash: Key128,
    uad: Key128,
}

/// Aggregate per-session counters, reported after every round.
#[derive(Debug, Default, Clone)]
pub struct RangingStats {
    pub rounds_completed: u32,
    pub rounds_failed: u32,
    pub rounds_hopped: u32,
    pub rx_ok: u32,
    pub rx_late: u32,
    pub rx_timeout: u32,
    pub rx_err: u32,
    pub sp0_errors: u32,
    pub events_dropped: u32,
}

#[derive(Error, Debug)]
pub enum SessionError {
    /// Session-scoped key derivation failed; the session cannot start
    /// or recover.
    #[error("Session key derivation failed: {0}")]
    KeyDerivation(#[from] CryptoError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation not allowed in state {state}")]
    BadState { state: SessionState },

    #[error("Frame codec failure: {0}")]
    Codec(#[from] CodecError),
}

/// One CCC ranging session on the Initiator side.
pub struct RangingSession<O: RangingObserver> {
    cfg: SessionConfig,
    observer: Arc<O>,
    state: SessionState,
    ursk: Zeroizing<Key256>,
    keys: Option<SessionKeys>,
    ring: Option<RoundKeyRing>,
    frame_counter: u32,
    block_index: u16,
    round_index: u8,
    /// Hop scheduled for the next block, mirrored into the wire frames.
    hop_flag: bool,
    workspace: RoundWorkspace,
    stats: RangingStats,
}

impl RangingSession<TracingObserver> {
    /// Create a session with the default tracing observer.
    pub fn new(cfg: SessionConfig, ursk: Key256) -> Result<Self, SessionError> {
        Self::with_observer(cfg, ursk, Arc::new(TracingObserver))
    }
}

impl RangingSession<NullObserver> {
    /// Create a session that reports nothing.
    pub fn silent(cfg: SessionConfig, ursk: Key256) -> Result<Self, SessionError> {
        Self::with_observer(cfg, ursk, Arc::new(NullObserver))
    }
}

impl<O: RangingObserver + 'static> RangingSession<O> {
    /// Create a session with a custom observer. The configuration is
    /// validated here, before it can affect anything.
    pub fn with_observer(
        cfg: SessionConfig,
        ursk: Key256,
        observer: Arc<O>,
    ) -> Result<Self, SessionError> {
        cfg.validate()?;
        let workspace = RoundWorkspace::new(cfg.n_responders, cfg.rounds_per_block);
        Ok(Self {
            cfg,
            observer,
            state: SessionState::Suspended,
            ursk: Zeroizing::new(ursk),
            keys: None,
            ring: None,
            frame_counter: 0,
            block_index: 0,
            round_index: 0,
            hop_flag: false,
            workspace,
            stats: RangingStats::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &RangingStats {
        &self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Key material the radio driver programs for the current round's
    /// STS generation. Fixed for the whole round once it opens.
    pub fn current_round_keys(&self) -> Result<&RoundKeys, SessionError> {
        Ok(self.active_parts()?.1.current())
    }

    /// mUPSK1, provisioned to the secure-element pairing layer.
    pub fn mupsk1(&self) -> Option<&Key128> {
        self.keys.as_ref().map(|k| &k.mupsk1)
    }

    /// Slot results for the current round.
    pub fn workspace(&self) -> &RoundWorkspace {
        &self.workspace
    }

    /// Interrupt-side view of the workspace.
    pub fn workspace_mut(&mut self) -> &mut RoundWorkspace {
        &mut self.workspace
    }

    fn goto_state(&mut self, new_state: SessionState) {
        if new_state != self.state {
            self.observer.on_event(&RangingEvent::StateChanged {
                from: self.state,
                to: new_state,
            });
            self.state = new_state;
        }
    }

    /// Replace the configuration. Rejected while rounds are running.
    pub fn set_config(&mut self, cfg: SessionConfig) -> Result<(), SessionError> {
        if self.state == SessionState::Active {
            return Err(SessionError::BadState { state: self.state });
        }
        cfg.validate()?;
        self.workspace = RoundWorkspace::new(cfg.n_responders, cfg.rounds_per_block);
        self.cfg = cfg;
        Ok(())
    }

    /// Derive session-scoped keys, stage the first round's key pair and
    /// go Active. A derivation failure here is fatal to the session.
    #[instrument(skip(self), fields(session_id = self.cfg.session_id))]
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Suspended {
            return Err(SessionError::BadState { state: self.state });
        }

        let keys = self.derive_session_keys()?;
        let sts_index0 = self.cfg.sts_index0;
        let first = Self::derive_one_round(&keys, sts_index0)?;

        match self.ring.as_mut() {
            Some(ring) => ring.reset(first),
            None => self.ring = Some(RoundKeyRing::new(first)),
        }
        self.keys = Some(keys);

        self.block_index = 0;
        self.round_index = 0;
        self.frame_counter = 0;
        self.hop_flag = false;
        self.stats = RangingStats::default();

        self.precompute_next();
        self.goto_state(SessionState::Active);
        self.observer.on_event(&RangingEvent::SessionStarted {
            session_id: self.cfg.session_id,
            sts_index0,
        });
        Ok(())
    }

    fn derive_session_keys(&self) -> Result<SessionKeys, CryptoError> {
        let (mupsk1, mupsk2) = derive_mupsk(&self.ursk)?;
        let mursk = derive_mursk(&self.ursk)?;
        let salt = derive_salt(&self.ursk)?;
        let salted_hash = derive_salted_hash(&self.cfg.salted_hash_params(), &salt)?;
        let uad = derive_uad(&mupsk2, self.cfg.sts_index0)?;
        Ok(SessionKeys {
            mursk,
            mupsk1,
            mupsk2,
            salt,
            salted_hash,
            uad,
        })
    }

    fn derive_one_round(keys: &SessionKeys, sts_index: u32) -> Result<RoundKeys, CryptoError> {
        let (d_ursk, d_udsk) = derive_round_keys(&keys.mursk, sts_index, &keys.salted_hash)?;
        Ok(RoundKeys {
            d_ursk,
            d_udsk,
            sts_index,
        })
    }

    /// Opportunistically fill the spare key slot one round ahead.
    /// Failure is non-fatal; the next round derives on demand.
    fn precompute_next(&mut self) {
        let (Some(keys), Some(ring)) = (self.keys.as_ref(), self.ring.as_mut()) else {
            return;
        };
        let next_sts = ring.current().sts_index.wrapping_add(1);
        match Self::derive_one_round(keys, next_sts) {
            Ok(round_keys) => {
                ring.store_precalc(round_keys);
                self.observer
                    .on_event(&RangingEvent::KdfPrecomputed { sts_index: next_sts });
            }
            Err(e) => {
                self.observer.on_event(&RangingEvent::Error {
                    message: format!("Round key precompute failed: {}", e),
                });
            }
        }
    }

    fn active_parts(&self) -> Result<(&SessionKeys, &RoundKeyRing), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::BadState { state: self.state });
        }
        match (self.keys.as_ref(), self.ring.as_ref()) {
            (Some(keys), Some(ring)) => Ok((keys, ring)),
            _ => Err(SessionError::BadState { state: self.state }),
        }
    }

    /// Zero the workspace for a new round. Called once at round entry;
    /// the key slot used for the round is fixed from here on.
    pub fn begin_round(&mut self) -> Result<(), SessionError> {
        self.active_parts()?;
        self.workspace
            .reset_for_new_round(self.block_index, self.round_index as u16);
        Ok(())
    }

    fn next_frame_counter(&mut self) -> u32 {
        let fc = self.frame_counter;
        self.frame_counter = self.frame_counter.wrapping_add(1);
        fc
    }

    /// Build the PrePoll frame opening the current round.
    pub fn next_prepoll(&mut self) -> Result<Vec<u8>, SessionError> {
        let (keys, ring) = self.active_parts()?;
        let prepoll = PrePoll {
            session_id: self.cfg.session_id,
            sts_index: ring.current().sts_index,
            block_index: self.block_index,
            hop_flag: self.hop_flag,
            round_index: self.round_index as u16,
        };
        let frame_keys = FrameKeys {
            d_udsk: &ring.current().d_udsk,
            uad: &keys.uad,
        };
        let frame = build_prepoll(
            &prepoll,
            self.cfg.dst_short_addr,
            self.frame_counter,
            &frame_keys,
            self.cfg.encrypted,
        )?;
        self.next_frame_counter();
        Ok(frame)
    }

    /// Build the FinalData frame closing the current round, carrying
    /// every responder that answered.
    pub fn next_finaldata(&mut self, final_tx_timestamp: u64) -> Result<Vec<u8>, SessionError> {
        let (keys, ring) = self.active_parts()?;
        let finaldata = FinalData {
            session_id: self.cfg.session_id,
            block_index: self.block_index,
            hop_flag: self.hop_flag,
            round_index: self.round_index as u16,
            final_sts_index: ring.current().sts_index,
            final_tx_timestamp,
            records: self.workspace.responder_records(),
        };
        let frame_keys = FrameKeys {
            d_udsk: &ring.current().d_udsk,
            uad: &keys.uad,
        };
        let frame = build_finaldata(
            &finaldata,
            self.cfg.dst_short_addr,
            self.frame_counter,
            &frame_keys,
            self.cfg.encrypted,
        )?;
        self.next_frame_counter();
        Ok(frame)
    }

    /// Decrypt and classify a received SP0 frame, recording the slot
    /// outcome. Codec failures are absorbed into `RxSp0Err`; this never
    /// returns an error.
    pub fn handle_rx_frame(
        &mut self,
        slot_idx: usize,
        timestamp: u64,
        sts_quality: u16,
        sts_status: u16,
        frame: &[u8],
    ) -> SlotOutcome {
        let outcome = match self.active_parts() {
            Ok((keys, ring)) => {
                let frame_keys = FrameKeys {
                    d_udsk: &ring.current().d_udsk,
                    uad: &keys.uad,
                };
                match decrypt_frame(frame, &frame_keys, self.cfg.encrypted) {
                    Ok((_, msg)) => {
                        let session_id = match &msg {
                            Sp0Message::PrePoll(pp) => pp.session_id,
                            Sp0Message::FinalData(fd) => fd.session_id,
                        };
                        if session_id == self.cfg.session_id {
                            SlotOutcome::RxOk
                        } else {
                            SlotOutcome::RxFilterReject
                        }
                    }
                    Err(_) => SlotOutcome::RxSp0Err,
                }
            }
            Err(_) => SlotOutcome::RxErr,
        };
        self.workspace
            .record_rx_result(slot_idx, timestamp, sts_quality, sts_status, outcome);
        outcome
    }

    /// Apply queued interrupt events at the round-complete barrier.
    pub fn drain_events(&mut self, receiver: &SlotEventReceiver) -> usize {
        let applied = receiver.drain_into(&mut self.workspace);
        self.stats.events_dropped = receiver.dropped();
        applied
    }

    /// Mark every unfilled slot as missed and let the round complete
    /// through the normal path. There is no separate abandon path.
    pub fn abandon_round(&mut self) {
        self.workspace.abandon_remaining();
    }

    /// Close the current round: evaluate the hop criterion, pick the
    /// next block's round index, promote (or derive) the next round's
    /// keys and precompute one more round ahead.
    ///
    /// All slot outcomes must be recorded before this is called.
    #[instrument(skip(self), fields(block = self.block_index, round = self.round_index))]
    pub fn on_round_complete(&mut self) -> Result<(), SessionError> {
        self.active_parts()?;

        let good_rx = self.workspace.count_successful_responses();
        let hist = self.workspace.outcome_histogram();
        self.stats.rounds_completed += 1;
        self.stats.rx_ok += hist[SlotOutcome::RxOk.code() as usize] as u32;
        self.stats.rx_late += hist[SlotOutcome::RxLate.code() as usize] as u32;
        self.stats.rx_timeout += hist[SlotOutcome::RxTimeout.code() as usize] as u32;
        self.stats.rx_err += hist[SlotOutcome::RxErr.code() as usize] as u32;
        self.stats.sp0_errors += hist[SlotOutcome::RxSp0Err.code() as usize] as u32;
        if good_rx == 0 {
            self.stats.rounds_failed += 1;
        }

        let hopped = evaluate_hop_criterion(good_rx);
        let next_block = self.block_index.wrapping_add(1);
        if hopped {
            let hop_index = calc_hop_index(
                self.cfg.hop_mode,
                self.cfg.hop_mode_key,
                self.cfg.rounds_per_block,
                next_block,
                self.round_index,
            );
            self.observer.on_event(&RangingEvent::HopDecision {
                block_index: next_block,
                hop_index,
            });
            self.stats.rounds_hopped += 1;
            self.round_index = hop_index;
        }
        self.hop_flag = hopped;

        self.observer.on_event(&RangingEvent::RoundCompleted {
            block_index: self.block_index,
            round_index: self.workspace.round_index,
            good_rx,
            hopped,
        });

        // Promote the precomputed keys; derive on demand if the spare
        // slot was empty or stale.
        if self.rotate_round_keys() {
            self.block_index = next_block;
            self.precompute_next();
        } else {
            // Never re-run a round on the previous round's keys. Drop
            // the ring; the session must recover before ranging again.
            self.ring = None;
            self.goto_state(SessionState::Suspended);
        }

        self.observer.on_event(&RangingEvent::StatsUpdated {
            stats: self.stats.clone(),
        });
        Ok(())
    }

    /// Move the ring to the next round's STS index. Returns false when
    /// no valid keys exist for the next round.
    fn rotate_round_keys(&mut self) -> bool {
        let (Some(keys), Some(ring)) = (self.keys.as_ref(), self.ring.as_mut()) else {
            return false;
        };
        let next_sts = ring.current().sts_index.wrapping_add(1);
        if let Some(pre) = ring.precalc() {
            if pre.sts_index == next_sts {
                ring.advance();
                return true;
            }
            ring.invalidate_precalc();
        }
        match Self::derive_one_round(keys, next_sts) {
            Ok(round_keys) => {
                ring.store_precalc(round_keys);
                ring.advance();
                true
            }
            Err(e) => {
                self.stats.rounds_failed += 1;
                self.observer.on_event(&RangingEvent::Error {
                    message: format!("Round key rotation failed: {}", e),
                });
                false
            }
        }
    }

    /// Re-derive parameter-bound material after an external change to
    /// RAN parameters or `sts_index0`. Session-scoped keys survive
    /// unless the URSK itself changed.
    #[instrument(skip(self, new_ursk))]
    pub fn recover(
        &mut self,
        new_cfg: Option<SessionConfig>,
        new_ursk: Option<Key256>,
    ) -> Result<(), SessionError> {
        // Reject a bad config before it can touch the running session.
        if let Some(cfg) = &new_cfg {
            cfg.validate()?;
        }

        let prev = self.state;
        self.goto_state(SessionState::Recovering);

        if let Some(cfg) = new_cfg {
            self.workspace = RoundWorkspace::new(cfg.n_responders, cfg.rounds_per_block);
            self.cfg = cfg;
        }

        let result = self.rederive_for_recovery(new_ursk);
        match result {
            Ok(()) => {
                self.goto_state(if prev == SessionState::Active {
                    SessionState::Active
                } else {
                    SessionState::Suspended
                });
                Ok(())
            }
            Err(e) => {
                self.keys = None;
                self.ring = None;
                self.goto_state(SessionState::Suspended);
                Err(SessionError::KeyDerivation(e))
            }
        }
    }

    fn rederive_for_recovery(&mut self, new_ursk: Option<Key256>) -> Result<(), CryptoError> {
        if let Some(ursk) = new_ursk {
            self.ursk = Zeroizing::new(ursk);
            self.keys = Some(self.derive_session_keys()?);
        } else if let Some(keys) = self.keys.as_mut() {
            let salted_hash = derive_salted_hash(&self.cfg.salted_hash_params(), &keys.salt)?;
            let uad = derive_uad(&keys.mupsk2, self.cfg.sts_index0)?;
            keys.salted_hash = salted_hash;
            keys.uad = uad;
        } else {
            self.keys = Some(self.derive_session_keys()?);
        }

        let keys = match self.keys.as_ref() {
            Some(k) => k,
            None => return Ok(()),
        };
        let sts_index = match self.cfg.sts_index_policy {
            StsIndexPolicy::Random => self.cfg.sts_index0,
            StsIndexPolicy::Continue => self
                .ring
                .as_ref()
                .map(|r| r.current().sts_index.wrapping_add(1))
                .unwrap_or(self.cfg.sts_index0),
        };
        let first = Self::derive_one_round(keys, sts_index)?;
        match self.ring.as_mut() {
            Some(ring) => ring.reset(first),
            None => self.ring = Some(RoundKeyRing::new(first)),
        }
        self.precompute_next();
        Ok(())
    }

    /// Pause ranging. All derived key material survives.
    pub fn suspend(&mut self) {
        if self.state == SessionState::Active {
            self.goto_state(SessionState::Suspended);
        }
    }

    /// Resume a suspended session without re-deriving anything. Only
    /// the slot records reset.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Suspended || self.keys.is_none() || self.ring.is_none() {
            return Err(SessionError::BadState { state: self.state });
        }
        self.workspace = RoundWorkspace::new(self.cfg.n_responders, self.cfg.rounds_per_block);
        self.goto_state(SessionState::Active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::FIRST_RESPONDER_SLOT;
    use crate::round::hop::{calc_aes_hop_si, expand_hop_key, HopMode};

    const URSK: Key256 = [0x77; 32];

    fn config(n_responders: u8) -> SessionConfig {
        SessionConfig {
            session_id: 0x0BAD_F00D,
            n_responders,
            sts_index0: 0x0001_0000,
            ..Default::default()
        }
    }

    fn active_session(n_responders: u8) -> RangingSession<NullObserver> {
        let mut s = RangingSession::silent(config(n_responders), URSK).unwrap();
        s.start().unwrap();
        s
    }

    fn record_all_ok(session: &mut RangingSession<NullObserver>, n: u8) {
        for i in 0..n as usize {
            session.workspace_mut().record_rx_result(
                FIRST_RESPONDER_SLOT + i,
                1000 + i as u64,
                0x8000,
                0,
                SlotOutcome::RxOk,
            );
        }
    }

    #[test]
    fn test_start_requires_suspended() {
        let mut s = active_session(5);
        assert!(matches!(
            s.start(),
            Err(SessionError::BadState {
                state: SessionState::Active
            })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_session_exists() {
        let cfg = SessionConfig {
            n_responders: 0,
            ..config(1)
        };
        assert!(RangingSession::silent(cfg, URSK).is_err());
    }

    #[test]
    fn test_scenario_all_responders_ok() {
        let mut s = active_session(5);
        s.begin_round().unwrap();
        record_all_ok(&mut s, 5);

        assert_eq!(s.workspace().count_successful_responses(), 5);
        s.on_round_complete().unwrap();

        assert_eq!(s.stats().rounds_completed, 1);
        assert_eq!(s.stats().rounds_hopped, 0);
        assert_eq!(s.stats().rx_ok, 5);
        assert!(!s.hop_flag);

        // Next round runs on keys derived for sts_index0 + 1.
        let keys = s.keys.as_ref().unwrap();
        let (exp_ursk, exp_udsk) =
            derive_round_keys(&keys.mursk, 0x0001_0001, &keys.salted_hash).unwrap();
        let cur = s.ring.as_ref().unwrap().current();
        assert_eq!(cur.sts_index, 0x0001_0001);
        assert_eq!(cur.d_ursk, exp_ursk);
        assert_eq!(cur.d_udsk, exp_udsk);
    }

    #[test]
    fn test_scenario_zero_responders_hops() {
        let mut cfg = config(5);
        cfg.hop_mode = HopMode::AesKeyed;
        cfg.hop_mode_key = 0x5EED_5EED;
        let mut s = RangingSession::silent(cfg, URSK).unwrap();
        s.start().unwrap();

        s.begin_round().unwrap();
        s.abandon_round();
        assert_eq!(s.workspace().count_successful_responses(), 0);
        s.on_round_complete().unwrap();

        assert_eq!(s.stats().rounds_hopped, 1);
        assert_eq!(s.stats().rounds_failed, 1);
        assert!(s.hop_flag);
        let expected =
            calc_aes_hop_si(&expand_hop_key(0x5EED_5EED), s.cfg.rounds_per_block, 1);
        assert_eq!(s.round_index, expected);
    }

    #[test]
    fn test_scenario_wrong_key_slot_fails_auth() {
        let mut s = active_session(3);
        s.begin_round().unwrap();
        let frame = s.next_prepoll().unwrap();

        // Decrypting with the precomputed (next round's) key must fail.
        let keys = s.keys.as_ref().unwrap();
        let ring = s.ring.as_ref().unwrap();
        let precalc = ring.precalc().expect("precompute staged at start");
        let wrong = FrameKeys {
            d_udsk: &precalc.d_udsk,
            uad: &keys.uad,
        };
        assert!(matches!(
            decrypt_frame(&frame, &wrong, true),
            Err(CodecError::AuthenticationFailed)
        ));

        // The right slot decrypts.
        let right = FrameKeys {
            d_udsk: &ring.current().d_udsk,
            uad: &keys.uad,
        };
        assert!(decrypt_frame(&frame, &right, true).is_ok());
    }

    #[test]
    fn test_handle_rx_frame_classifies_outcomes() {
        let mut s = active_session(3);
        s.begin_round().unwrap();
        let frame = s.next_prepoll().unwrap();

        assert_eq!(
            s.handle_rx_frame(FIRST_RESPONDER_SLOT, 100, 0x8000, 0, &frame),
            SlotOutcome::RxOk
        );

        let mut tampered = s.next_prepoll().unwrap();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xFF;
        assert_eq!(
            s.handle_rx_frame(FIRST_RESPONDER_SLOT + 1, 200, 0x8000, 0, &tampered),
            SlotOutcome::RxSp0Err
        );
    }

    #[test]
    fn test_precompute_keeps_ring_ready() {
        let mut s = active_session(2);
        assert!(s.ring.as_ref().unwrap().is_ready());

        for _ in 0..3 {
            s.begin_round().unwrap();
            record_all_ok(&mut s, 2);
            s.on_round_complete().unwrap();
            assert!(s.ring.as_ref().unwrap().is_ready());
        }
        assert_eq!(
            s.ring.as_ref().unwrap().current().sts_index,
            0x0001_0000 + 3
        );
        assert_eq!(s.block_index, 3);
    }

    #[test]
    fn test_suspend_resume_preserves_keys() {
        let mut s = active_session(2);
        s.begin_round().unwrap();
        record_all_ok(&mut s, 2);
        s.on_round_complete().unwrap();

        let sts_before = s.ring.as_ref().unwrap().current().sts_index;
        s.suspend();
        assert_eq!(s.state(), SessionState::Suspended);
        s.resume().unwrap();
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.ring.as_ref().unwrap().current().sts_index, sts_before);
    }

    #[test]
    fn test_recover_rederives_salted_hash_only() {
        let mut s = active_session(2);
        let mursk_before = s.keys.as_ref().unwrap().mursk;
        let sh_before = s.keys.as_ref().unwrap().salted_hash;

        let mut cfg = s.config().clone();
        cfg.slot_duration_rstu += 100;
        s.recover(Some(cfg), None).unwrap();

        let keys = s.keys.as_ref().unwrap();
        assert_eq!(keys.mursk, mursk_before);
        assert_ne!(keys.salted_hash, sh_before);
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn test_recover_with_new_ursk_changes_everything() {
        let mut s = active_session(2);
        let mursk_before = s.keys.as_ref().unwrap().mursk;
        s.recover(None, Some([0x78; 32])).unwrap();
        assert_ne!(s.keys.as_ref().unwrap().mursk, mursk_before);
    }

    #[test]
    fn test_recover_rejects_bad_config_without_touching_session() {
        let mut s = active_session(2);
        let sh_before = s.keys.as_ref().unwrap().salted_hash;
        let sts_before = s.ring.as_ref().unwrap().current().sts_index;

        let bad = SessionConfig {
            channel: 7,
            ..s.config().clone()
        };
        assert!(matches!(
            s.recover(Some(bad), None),
            Err(SessionError::Config(_))
        ));

        // Still Active on the old parameters; ranging continues.
        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.keys.as_ref().unwrap().salted_hash, sh_before);
        assert_eq!(s.ring.as_ref().unwrap().current().sts_index, sts_before);
        s.begin_round().unwrap();
        s.next_prepoll().unwrap();
    }

    #[test]
    fn test_lost_key_ring_requires_recovery() {
        let mut s = active_session(2);
        // Failed key rotation drops the ring and suspends the session.
        s.ring = None;
        s.goto_state(SessionState::Suspended);

        assert!(matches!(s.resume(), Err(SessionError::BadState { .. })));

        s.recover(None, None).unwrap();
        assert!(s.ring.is_some());
        s.resume().unwrap();
        assert_eq!(s.state(), SessionState::Active);
        s.begin_round().unwrap();
        s.next_prepoll().unwrap();
    }

    #[test]
    fn test_frame_counter_monotonic() {
        let mut s = active_session(2);
        s.begin_round().unwrap();
        let f1 = s.next_prepoll().unwrap();
        let f2 = s.next_prepoll().unwrap();
        let h1 = crate::protocol::frames::MacHeader::from_bytes(&f1).unwrap();
        let h2 = crate::protocol::frames::MacHeader::from_bytes(&f2).unwrap();
        assert_eq!(h2.frame_counter, h1.frame_counter + 1);
    }

    #[test]
    fn test_finaldata_carries_responder_records() {
        let mut s = active_session(4);
        s.begin_round().unwrap();
        record_all_ok(&mut s, 2);
        let frame = s.next_finaldata(0xAB_CDEF).unwrap();

        let keys = s.keys.as_ref().unwrap();
        let ring = s.ring.as_ref().unwrap();
        let fk = FrameKeys {
            d_udsk: &ring.current().d_udsk,
            uad: &keys.uad,
        };
        let (_, msg) = decrypt_frame(&frame, &fk, true).unwrap();
        match msg {
            Sp0Message::FinalData(fd) => {
                assert_eq!(fd.records.len(), 2);
                assert_eq!(fd.final_tx_timestamp, 0xAB_CDEF);
                assert_eq!(fd.final_sts_index, 0x0001_0000);
            }
            other => panic!("expected FinalData, got {:?}", other),
        }
    }
}
