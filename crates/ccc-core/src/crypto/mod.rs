//! Cryptographic engine: key-derivation cascade and CCM* AEAD.
//!
//! All primitives come from the RustCrypto crates (`aes`, `cmac`, `ccm`);
//! this module only arranges inputs and outputs per the CCC derivation
//! and frame-protection rules.

pub mod aead;
pub mod kdf;

use thiserror::Error;

/// 128-bit key or derived value.
pub type Key128 = [u8; 16];

/// 256-bit key or derived value.
pub type Key256 = [u8; 32];

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("AEAD operation failed")]
    Aead,
}

pub use kdf::{
    derive_mupsk, derive_mursk, derive_round_keys, derive_salt, derive_salted_hash, derive_uad,
    SaltedHashParams,
};
