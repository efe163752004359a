//! Key-derivation cascade: URSK down to per-round dURSK/dUDSK.
//!
//! Every derivation is a NIST SP 800-108 counter-mode KDF with
//! AES-256-CMAC as the PRF. One PRF block is
//! `CMAC(K, counter_be32 || label || 0x00 || context || length_be32)`
//! where `length` is the total output size in bits.

use aes::{Aes128, Aes256};
use cmac::{Cmac, Mac};

use crate::crypto::{CryptoError, Key128, Key256};
use crate::protocol::constants::{
    KDF_LEN_128, KDF_LEN_256, KDF_LEN_384, LABEL_SALT, LABEL_UAD, LABEL_UDSK, LABEL_UPSK,
    LABEL_URSK, LABEL_URSK_KT,
};

/// Negotiated parameters bound into the salted hash.
///
/// Both peers must agree on every field; a mismatch yields different
/// round keys and every frame fails authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaltedHashParams {
    pub protocol_version: u16,
    pub config_id: u8,
    pub session_id: u32,
    pub sts_index0: u32,
    pub n_responders: u8,
    pub block_duration_ms: u32,
    pub slots_per_round: u8,
    pub slot_duration_rstu: u16,
    pub pulse_shape_combo: u8,
}

impl SaltedHashParams {
    /// Pack into the fixed 20-byte context block, all fields big-endian.
    fn to_bytes(self) -> [u8; 20] {
        let mut buf = [0u8; 20];
        buf[0..2].copy_from_slice(&self.protocol_version.to_be_bytes());
        buf[2] = self.config_id;
        buf[3..7].copy_from_slice(&self.session_id.to_be_bytes());
        buf[7..11].copy_from_slice(&self.sts_index0.to_be_bytes());
        buf[11] = self.n_responders;
        buf[12..16].copy_from_slice(&self.block_duration_ms.to_be_bytes());
        buf[16] = self.slots_per_round;
        buf[17..19].copy_from_slice(&self.slot_duration_rstu.to_be_bytes());
        buf[19] = self.pulse_shape_combo;
        buf
    }
}

/// One AES-256-CMAC PRF invocation over the SP 800-108 block layout.
fn prf_block(
    key: &Key256,
    counter: u32,
    label: &[u8],
    context: &[u8],
    length_bits: u32,
) -> Result<Key128, CryptoError> {
    let mut mac =
        Cmac::<Aes256>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: key.len(),
        })?;
    mac.update(&counter.to_be_bytes());
    mac.update(label);
    mac.update(&[0x00]);
    mac.update(context);
    mac.update(&length_bits.to_be_bytes());
    Ok(mac.finalize().into_bytes().into())
}

/// Derive the session pre-shared keys from the root URSK.
///
/// Three PRF blocks with label `"UPSK"`; mUPSK1 is block 1,
/// mUPSK2 is block 3 followed by block 2.
pub fn derive_mupsk(ursk: &Key256) -> Result<(Key128, Key256), CryptoError> {
    let ctx = [0u8; 3];
    let b1 = prf_block(ursk, 1, LABEL_UPSK, &ctx, KDF_LEN_384)?;
    let b2 = prf_block(ursk, 2, LABEL_UPSK, &ctx, KDF_LEN_384)?;
    let b3 = prf_block(ursk, 3, LABEL_UPSK, &ctx, KDF_LEN_384)?;
    let mut mupsk2 = [0u8; 32];
    mupsk2[..16].copy_from_slice(&b3);
    mupsk2[16..].copy_from_slice(&b2);
    Ok((b1, mupsk2))
}

/// Derive the masked session ranging key from the root URSK.
///
/// Two PRF blocks with label `"URSK"`; result is block 2 followed by block 1.
pub fn derive_mursk(ursk: &Key256) -> Result<Key256, CryptoError> {
    let ctx = [0u8; 3];
    let b1 = prf_block(ursk, 1, LABEL_URSK, &ctx, KDF_LEN_256)?;
    let b2 = prf_block(ursk, 2, LABEL_URSK, &ctx, KDF_LEN_256)?;
    let mut mursk = [0u8; 32];
    mursk[..16].copy_from_slice(&b2);
    mursk[16..].copy_from_slice(&b1);
    Ok(mursk)
}

/// Derive the 128-bit session salt from the root URSK.
pub fn derive_salt(ursk: &Key256) -> Result<Key128, CryptoError> {
    prf_block(ursk, 1, LABEL_SALT, &[0u8; 3], KDF_LEN_128)
}

/// Bind all negotiated session parameters into one 128-bit value.
///
/// AES-128-CMAC keyed by the session salt over the packed parameter block.
pub fn derive_salted_hash(
    params: &SaltedHashParams,
    salt: &Key128,
) -> Result<Key128, CryptoError> {
    let mut mac =
        Cmac::<Aes128>::new_from_slice(salt).map_err(|_| CryptoError::InvalidKeyLength {
            expected: 16,
            actual: salt.len(),
        })?;
    mac.update(&params.to_bytes());
    Ok(mac.finalize().into_bytes().into())
}

/// Derive the UWB address derivation value from mUPSK2.
pub fn derive_uad(mupsk2: &Key256, sts_index0: u32) -> Result<Key128, CryptoError> {
    prf_block(mupsk2, 1, LABEL_UAD, &sts_index0.to_be_bytes(), KDF_LEN_128)
}

/// Derive one round's key pair from mURSK.
///
/// Two-stage cascade: an intermediate 256-bit `URSK_KT` bound to the STS
/// index, then `dURSK` (label `"URSK"`) and `dUDSK` (label `"UDSK"`) both
/// bound to the salted hash.
pub fn derive_round_keys(
    mursk: &Key256,
    sts_index: u32,
    salted_hash: &Key128,
) -> Result<(Key128, Key128), CryptoError> {
    // STS index sits in the low bytes of a 32-byte context.
    let mut kt_ctx = [0u8; 32];
    kt_ctx[28..].copy_from_slice(&sts_index.to_be_bytes());

    let b1 = prf_block(mursk, 1, LABEL_URSK_KT, &kt_ctx, KDF_LEN_256)?;
    let b2 = prf_block(mursk, 2, LABEL_URSK_KT, &kt_ctx, KDF_LEN_256)?;
    let mut ursk_kt = [0u8; 32];
    ursk_kt[..16].copy_from_slice(&b2);
    ursk_kt[16..].copy_from_slice(&b1);

    let d_ursk = prf_block(&ursk_kt, 1, LABEL_URSK, salted_hash, KDF_LEN_128)?;
    let d_udsk = prf_block(&ursk_kt, 1, LABEL_UDSK, salted_hash, KDF_LEN_128)?;
    Ok((d_ursk, d_udsk))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URSK: Key256 = [0x42; 32];

    fn params() -> SaltedHashParams {
        SaltedHashParams {
            protocol_version: 0x0100,
            config_id: 1,
            session_id: 0xDEAD_BEEF,
            sts_index0: 0x0001_0000,
            n_responders: 5,
            block_duration_ms: 96,
            slots_per_round: 12,
            slot_duration_rstu: 2400,
            pulse_shape_combo: 0x11,
        }
    }

    #[test]
    fn test_kdf_deterministic() {
        let (p1a, p2a) = derive_mupsk(&URSK).unwrap();
        let (p1b, p2b) = derive_mupsk(&URSK).unwrap();
        assert_eq!(p1a, p1b);
        assert_eq!(p2a, p2b);

        let ma = derive_mursk(&URSK).unwrap();
        let mb = derive_mursk(&URSK).unwrap();
        assert_eq!(ma, mb);

        let ua = derive_uad(&p2a, 7).unwrap();
        let ub = derive_uad(&p2a, 7).unwrap();
        assert_eq!(ua, ub);
    }

    #[test]
    fn test_session_keys_distinct() {
        let (mupsk1, mupsk2) = derive_mupsk(&URSK).unwrap();
        let mursk = derive_mursk(&URSK).unwrap();
        assert_ne!(&mupsk2[..16], &mupsk1[..]);
        assert_ne!(mursk, mupsk2);
        assert_ne!(&mursk[..16], &mupsk1[..]);
    }

    #[test]
    fn test_round_keys_depend_on_sts_index() {
        let mursk = derive_mursk(&URSK).unwrap();
        let salt = derive_salt(&URSK).unwrap();
        let sh = derive_salted_hash(&params(), &salt).unwrap();

        let (ursk_a, udsk_a) = derive_round_keys(&mursk, 100, &sh).unwrap();
        let (ursk_b, udsk_b) = derive_round_keys(&mursk, 101, &sh).unwrap();
        assert_ne!(ursk_a, ursk_b);
        assert_ne!(udsk_a, udsk_b);
        // dURSK and dUDSK differ from each other at every index.
        assert_ne!(ursk_a, udsk_a);
        assert_ne!(ursk_b, udsk_b);
    }

    #[test]
    fn test_cascade_independence() {
        // Changing the STS index must not touch session-scoped keys.
        let mursk_a = derive_mursk(&URSK).unwrap();
        let mursk_b = derive_mursk(&URSK).unwrap();
        assert_eq!(mursk_a, mursk_b);

        // Changing the URSK changes everything downstream.
        let other: Key256 = [0x43; 32];
        assert_ne!(derive_mursk(&other).unwrap(), mursk_a);
        assert_ne!(derive_salt(&other).unwrap(), derive_salt(&URSK).unwrap());
    }

    #[test]
    fn test_salted_hash_binds_every_parameter() {
        let salt = derive_salt(&URSK).unwrap();
        let base = derive_salted_hash(&params(), &salt).unwrap();

        let mut p = params();
        p.slot_duration_rstu = 2401;
        assert_ne!(derive_salted_hash(&p, &salt).unwrap(), base);

        let mut p = params();
        p.n_responders = 6;
        assert_ne!(derive_salted_hash(&p, &salt).unwrap(), base);

        let mut p = params();
        p.session_id ^= 1;
        assert_ne!(derive_salted_hash(&p, &salt).unwrap(), base);
    }
}
