//! SP0 wire protocol: constants, frame structures and the AEAD codec.

pub mod codec;
pub mod constants;
pub mod frames;

pub use codec::{build_finaldata, build_prepoll, decrypt_frame, CodecError, FrameKeys, Sp0Message};
pub use frames::{FinalData, MacHeader, PrePoll, ResponderRecord};
