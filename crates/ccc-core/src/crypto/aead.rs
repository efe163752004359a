//! AES-CCM* frame protection for SP0 payloads.
//!
//! ENC-MIC-64: 8-byte MIC, 13-byte nonce, MAC header authenticated as
//! associated data. Nonce layout: `uad[0..8] || frame_counter_be32 || 0x06`.

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U8};
use ccm::Ccm;

use crate::crypto::{CryptoError, Key128};
use crate::protocol::constants::{NONCE_LEN, SEC_LVL_ENC_MIC_64};

/// CCM with 8-byte tag and 13-byte nonce, per ENC_MIC_64.
type Sp0Ccm = Ccm<Aes128, U8, U13>;

/// Build the 13-byte CCM* nonce for one frame.
pub fn build_nonce(uad: &Key128, frame_counter: u32) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&uad[..8]);
    nonce[8..12].copy_from_slice(&frame_counter.to_be_bytes());
    nonce[12] = SEC_LVL_ENC_MIC_64;
    nonce
}

/// Encrypt `plaintext`, returning ciphertext with the 8-byte MIC appended.
pub fn ccm_star_encrypt(
    key: &Key128,
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Sp0Ccm::new(GenericArray::from_slice(key));
    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

/// Decrypt ciphertext-plus-MIC. Fails if the MIC does not verify.
pub fn ccm_star_decrypt(
    key: &Key128,
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Sp0Ccm::new(GenericArray::from_slice(key));
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::MIC_LEN;

    const KEY: Key128 = [0x11; 16];
    const UAD: Key128 = [0x22; 16];

    #[test]
    fn test_nonce_layout() {
        let nonce = build_nonce(&UAD, 0x01020304);
        assert_eq!(&nonce[..8], &UAD[..8]);
        assert_eq!(&nonce[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(nonce[12], SEC_LVL_ENC_MIC_64);
    }

    #[test]
    fn test_encrypt_appends_mic() {
        let nonce = build_nonce(&UAD, 1);
        let ct = ccm_star_encrypt(&KEY, &nonce, b"hdr", b"payload").unwrap();
        assert_eq!(ct.len(), b"payload".len() + MIC_LEN);
    }

    #[test]
    fn test_roundtrip() {
        let nonce = build_nonce(&UAD, 7);
        let ct = ccm_star_encrypt(&KEY, &nonce, b"hdr", b"payload").unwrap();
        let pt = ccm_star_decrypt(&KEY, &nonce, b"hdr", &ct).unwrap();
        assert_eq!(pt, b"payload");
    }

    #[test]
    fn test_wrong_counter_fails() {
        let ct = ccm_star_encrypt(&KEY, &build_nonce(&UAD, 7), b"hdr", b"payload").unwrap();
        assert!(ccm_star_decrypt(&KEY, &build_nonce(&UAD, 8), b"hdr", &ct).is_err());
    }

    #[test]
    fn test_tampered_aad_fails() {
        let nonce = build_nonce(&UAD, 7);
        let ct = ccm_star_encrypt(&KEY, &nonce, b"hdr", b"payload").unwrap();
        assert!(ccm_star_decrypt(&KEY, &nonce, b"hdx", &ct).is_err());
    }
}
