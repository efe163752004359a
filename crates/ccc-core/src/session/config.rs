//! Session configuration surface.
//!
//! Parameters arrive from the management layer as a flat key/value set;
//! this module holds the typed in-memory form, validation, and the raw
//! hop-config bitmask decoding. Validation runs before a session can be
//! created, so an active session never sees an invalid configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::kdf::SaltedHashParams;
use crate::protocol::constants::{MAX_NB_RESPONDERS, NB_TX_SLOTS};
use crate::round::hop::HopMode;

/// Hop-config bitmask: default deterministic sequence.
pub const HOP_CFG_DEFAULT_SEQ: u8 = 0x01;
/// Hop-config bitmask: AES-keyed sequence.
pub const HOP_CFG_AES_SEQ: u8 = 0x02;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: u32 },

    #[error("Invalid hop config bitmask 0x{mask:02X}")]
    InvalidHopConfig { mask: u8 },

    #[error("Round needs {required} slots but only {available} configured")]
    SlotBudget { required: u8, available: u8 },
}

impl HopMode {
    /// Decode the wire/config bitmask. Selecting both sequences (or any
    /// unknown bit) is a configuration error; the caller falls back to
    /// `HopMode::None`.
    pub fn from_bitmask(mask: u8) -> Result<Self, ConfigError> {
        match mask {
            0x00 => Ok(HopMode::None),
            HOP_CFG_DEFAULT_SEQ => Ok(HopMode::Default),
            HOP_CFG_AES_SEQ => Ok(HopMode::AesKeyed),
            _ => Err(ConfigError::InvalidHopConfig { mask }),
        }
    }

    pub fn to_bitmask(self) -> u8 {
        match self {
            HopMode::None => 0x00,
            HopMode::Default => HOP_CFG_DEFAULT_SEQ,
            HopMode::AesKeyed => HOP_CFG_AES_SEQ,
        }
    }
}

/// How the first STS index of a session is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StsIndexPolicy {
    /// Caller supplies a fresh random `sts_index0`.
    Random,
    /// Continue from the last index after recovery.
    Continue,
}

/// Configuration for one ranging session. Read-only to the engine while
/// a round is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: u32,
    pub protocol_version: u16,
    pub config_id: u8,
    /// UWB channel (CCC uses 5 or 9).
    pub channel: u8,
    pub slot_duration_rstu: u16,
    pub slots_per_round: u8,
    pub n_responders: u8,
    pub block_duration_ms: u32,
    pub rounds_per_block: u8,
    pub hop_mode: HopMode,
    pub hop_mode_key: u32,
    pub pulse_shape_combo: u8,
    pub sts_index_policy: StsIndexPolicy,
    pub sts_index0: u32,
    pub dst_short_addr: u16,
    /// SP0 payload encryption on/off.
    pub encrypted: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: 0,
            protocol_version: 0x0100,
            config_id: 0,
            channel: 9,
            slot_duration_rstu: 2400,
            slots_per_round: 16,
            n_responders: 1,
            block_duration_ms: 96,
            rounds_per_block: 4,
            hop_mode: HopMode::None,
            hop_mode_key: 0,
            pulse_shape_combo: 0x11,
            sts_index_policy: StsIndexPolicy::Random,
            sts_index0: 0,
            dst_short_addr: 0xFFFF,
            encrypted: true,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject out-of-range parameters before they can reach a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel != 5 && self.channel != 9 {
            return Err(ConfigError::OutOfRange {
                field: "channel",
                value: self.channel as u32,
            });
        }
        if self.n_responders == 0 || self.n_responders as usize > MAX_NB_RESPONDERS {
            return Err(ConfigError::OutOfRange {
                field: "n_responders",
                value: self.n_responders as u32,
            });
        }
        if self.slot_duration_rstu == 0 {
            return Err(ConfigError::OutOfRange {
                field: "slot_duration_rstu",
                value: 0,
            });
        }
        if self.rounds_per_block == 0 {
            return Err(ConfigError::OutOfRange {
                field: "rounds_per_block",
                value: 0,
            });
        }
        if self.block_duration_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "block_duration_ms",
                value: 0,
            });
        }
        let required = NB_TX_SLOTS as u8 + self.n_responders;
        if self.slots_per_round < required {
            return Err(ConfigError::SlotBudget {
                required,
                available: self.slots_per_round,
            });
        }
        Ok(())
    }

    /// The negotiated parameters bound into the salted hash.
    pub fn salted_hash_params(&self) -> SaltedHashParams {
        SaltedHashParams {
            protocol_version: self.protocol_version,
            config_id: self.config_id,
            session_id: self.session_id,
            sts_index0: self.sts_index0,
            n_responders: self.n_responders,
            block_duration_ms: self.block_duration_ms,
            slots_per_round: self.slots_per_round,
            slot_duration_rstu: self.slot_duration_rstu,
            pulse_shape_combo: self.pulse_shape_combo,
        }
    }
}
