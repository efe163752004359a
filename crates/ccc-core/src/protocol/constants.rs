//! Protocol constants for the CCC secure ranging engine.
//!
//! Wire values are shared with peer devices and cannot change without
//! breaking interoperability.

// ============================================================================
// MAC header
// ============================================================================

/// Fixed 802.15.4 frame control for SP0 ranging frames:
/// data frame, security enabled, PAN-ID compression, IE present,
/// short destination address, frame version 2, no source address.
pub const CCC_FCTRL: u16 = 0x2A49;

/// Default destination short address (broadcast).
pub const DST_SHORT_BCAST: u16 = 0xFFFF;

/// Security control byte: ENC-MIC-64 (level 6) | key-id-mode 2.
pub const SEC_CTRL_ENC_MIC_64: u8 = 0x16;

/// Bare security level carried in the last nonce byte.
pub const SEC_LVL_ENC_MIC_64: u8 = 0x06;

/// Fixed key index in the auxiliary security header.
pub const KEY_INDEX: u8 = 0xAA;

/// MIC length in bytes (ENC_MIC_64).
pub const MIC_LEN: usize = 8;

/// CCM* nonce length in bytes.
pub const NONCE_LEN: usize = 13;

/// Vendor header IE descriptor: content length 5, header-IE element id 0x00.
pub const VENDOR_HDR_IE: u16 = 0x0005;

/// Vendor OUI carried in the vendor header IE.
pub const CCC_VENDOR_OUI: [u8; 3] = [0x6A, 0xFA, 0x5C];

/// Header termination IE 2 (no payload IEs follow).
pub const HT2_IE: u16 = 0x3F80;

/// Total MAC header length: frame control (2) + dst short (2) +
/// aux security header (10) + vendor IE (7) + HT2 (2).
pub const MHR_LEN: usize = 23;

// ============================================================================
// SP0 messages
// ============================================================================

/// PrePoll message id in the vendor IE.
pub const MSG_ID_PREPOLL: u8 = 1;

/// FinalData message id in the vendor IE.
pub const MSG_ID_FINAL_DATA: u8 = 2;

/// PrePoll payload length.
pub const PREPOLL_PAYLOAD_LEN: usize = 13;

/// FinalData payload length before the responder records.
pub const FINAL_DATA_FIXED_LEN: usize = 22;

/// Length of one responder record in a FinalData payload.
pub const RESPONDER_RECORD_LEN: usize = 7;

// ============================================================================
// Round geometry
// ============================================================================

/// TX slots in a round: PrePoll, Poll, Final, FinalData.
pub const NB_TX_SLOTS: usize = 4;

/// Maximum responders addressed in one round.
pub const MAX_NB_RESPONDERS: usize = 10;

/// Maximum slots tracked per round.
pub const MAX_NB_SLOT: usize = NB_TX_SLOTS + MAX_NB_RESPONDERS;

/// First responder RX slot. Slot 0 is PrePoll, slot 1 is Poll.
pub const FIRST_RESPONDER_SLOT: usize = 2;

// ============================================================================
// Hop policy
// ============================================================================

/// Minimum successful responder receptions required to stay on the
/// current channel. Below this the next block hops.
pub const MIN_THRESH_RR_RESP_OK: u8 = 1;

// ============================================================================
// KDF labels and lengths
// ============================================================================

pub const LABEL_UPSK: &[u8] = b"UPSK";
pub const LABEL_URSK: &[u8] = b"URSK";
pub const LABEL_UDSK: &[u8] = b"UDSK";
pub const LABEL_URSK_KT: &[u8] = b"URSK_KT";
pub const LABEL_UAD: &[u8] = b"UAD";
pub const LABEL_SALT: &[u8] = b"SALT";

/// Output length fields (bits) for the counter-mode KDF.
pub const KDF_LEN_128: u32 = 0x0000_0080;
pub const KDF_LEN_256: u32 = 0x0000_0100;
pub const KDF_LEN_384: u32 = 0x0000_0180;
