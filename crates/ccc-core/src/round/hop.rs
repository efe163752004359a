//! Hop decision logic: whether the next block changes channel/slot
//! assignment, and which hop index it lands on.
//!
//! Both hop-index sequences are pure functions of
//! `(hop_key, rounds_per_block, block_index)`. Initiator and Responder
//! evaluate them independently and must agree, so there is no per-role
//! state anywhere in this module.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::crypto::Key128;
use crate::protocol::constants::MIN_THRESH_RR_RESP_OK;

/// Hop-index sequence selected by the session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HopMode {
    /// Same round index every block.
    None,
    /// Default deterministic sequence.
    Default,
    /// AES-keyed sequence.
    AesKeyed,
}

/// True when this round's responder success count demands a hop.
pub fn evaluate_hop_criterion(good_rx_count: u8) -> bool {
    good_rx_count < MIN_THRESH_RR_RESP_OK
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Default hop sequence: SplitMix64 over the hop key and block index,
/// reduced to a round index within the block.
pub fn calc_hop_si(hop_key: u32, rounds_per_block: u8, block_index: u16) -> u8 {
    debug_assert!(rounds_per_block > 0);
    let seed = ((hop_key as u64) << 16) ^ block_index as u64;
    (splitmix64(seed) % rounds_per_block as u64) as u8
}

/// AES-keyed hop sequence: encrypt the block index with the 128-bit hop
/// key and reduce the last eight ciphertext bytes.
pub fn calc_aes_hop_si(hop_key: &Key128, rounds_per_block: u8, block_index: u16) -> u8 {
    debug_assert!(rounds_per_block > 0);
    let cipher = Aes128::new(GenericArray::from_slice(hop_key));
    let mut block = GenericArray::clone_from_slice(&{
        let mut buf = [0u8; 16];
        buf[12..16].copy_from_slice(&(block_index as u32).to_be_bytes());
        buf
    });
    cipher.encrypt_block(&mut block);
    let tail = u64::from_be_bytes(block[8..16].try_into().unwrap());
    (tail % rounds_per_block as u64) as u8
}

/// Expand the 32-bit configured hop-mode key into the AES sequence key.
pub fn expand_hop_key(hop_mode_key: u32) -> Key128 {
    let mut key = [0u8; 16];
    key[12..16].copy_from_slice(&hop_mode_key.to_be_bytes());
    key
}

/// Hop index for the next block under the configured sequence, or the
/// unchanged round index when hopping is disabled.
pub fn calc_hop_index(
    mode: HopMode,
    hop_mode_key: u32,
    rounds_per_block: u8,
    block_index: u16,
    current_round_index: u8,
) -> u8 {
    match mode {
        HopMode::None => current_round_index,
        HopMode::Default => calc_hop_si(hop_mode_key, rounds_per_block, block_index),
        HopMode::AesKeyed => {
            calc_aes_hop_si(&expand_hop_key(hop_mode_key), rounds_per_block, block_index)
        }
    }
}
