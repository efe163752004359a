//! Plaintext structures for the two SP0 message types.
//!
//! The MAC header travels in the clear and is authenticated as associated
//! data; the payloads below are what gets encrypted.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::protocol::codec::CodecError;
use crate::protocol::constants::*;

/// SP0 MAC header (25 bytes).
///
/// Frame control, security control, key index, the vendor IE descriptor,
/// OUI and the HT2 terminator are all fixed values; only the destination
/// address, frame counter, key source and message fields vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacHeader {
    pub dst_short: u16,
    pub frame_counter: u32,
    pub key_source: [u8; 4],
    pub msg_id: u8,
    pub msg_len: u8,
}

impl MacHeader {
    pub const SIZE: usize = MHR_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u16::<LittleEndian>(CCC_FCTRL).unwrap();
        buf.write_u16::<LittleEndian>(self.dst_short).unwrap();
        buf.push(SEC_CTRL_ENC_MIC_64);
        buf.write_u32::<LittleEndian>(self.frame_counter).unwrap();
        buf.extend_from_slice(&self.key_source);
        buf.push(KEY_INDEX);
        buf.write_u16::<LittleEndian>(VENDOR_HDR_IE).unwrap();
        buf.extend_from_slice(&CCC_VENDOR_OUI);
        buf.push(self.msg_id);
        buf.push(self.msg_len);
        buf.write_u16::<LittleEndian>(HT2_IE).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::SIZE {
            return Err(CodecError::TooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);

        let fctrl = cursor.read_u16::<LittleEndian>()?;
        if fctrl != CCC_FCTRL {
            return Err(CodecError::Malformed {
                field: "frame_control",
                expected: CCC_FCTRL as u32,
                actual: fctrl as u32,
            });
        }
        let dst_short = cursor.read_u16::<LittleEndian>()?;

        let sec_ctrl = cursor.read_u8()?;
        if sec_ctrl != SEC_CTRL_ENC_MIC_64 {
            return Err(CodecError::Malformed {
                field: "security_control",
                expected: SEC_CTRL_ENC_MIC_64 as u32,
                actual: sec_ctrl as u32,
            });
        }
        let frame_counter = cursor.read_u32::<LittleEndian>()?;
        let mut key_source = [0u8; 4];
        for b in key_source.iter_mut() {
            *b = cursor.read_u8()?;
        }
        let key_index = cursor.read_u8()?;
        if key_index != KEY_INDEX {
            return Err(CodecError::Malformed {
                field: "key_index",
                expected: KEY_INDEX as u32,
                actual: key_index as u32,
            });
        }

        let ie_descr = cursor.read_u16::<LittleEndian>()?;
        if ie_descr != VENDOR_HDR_IE {
            return Err(CodecError::Malformed {
                field: "vendor_ie",
                expected: VENDOR_HDR_IE as u32,
                actual: ie_descr as u32,
            });
        }
        let mut oui = [0u8; 3];
        for b in oui.iter_mut() {
            *b = cursor.read_u8()?;
        }
        if oui != CCC_VENDOR_OUI {
            return Err(CodecError::Malformed {
                field: "vendor_oui",
                expected: u32::from_be_bytes([
                    0,
                    CCC_VENDOR_OUI[0],
                    CCC_VENDOR_OUI[1],
                    CCC_VENDOR_OUI[2],
                ]),
                actual: u32::from_be_bytes([0, oui[0], oui[1], oui[2]]),
            });
        }
        let msg_id = cursor.read_u8()?;
        let msg_len = cursor.read_u8()?;

        let ht2 = cursor.read_u16::<LittleEndian>()?;
        if ht2 != HT2_IE {
            return Err(CodecError::Malformed {
                field: "ht2",
                expected: HT2_IE as u32,
                actual: ht2 as u32,
            });
        }

        Ok(Self {
            dst_short,
            frame_counter,
            key_source,
            msg_id,
            msg_len,
        })
    }
}

/// PrePoll payload: announces the round about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrePoll {
    pub session_id: u32,
    pub sts_index: u32,
    pub block_index: u16,
    pub hop_flag: bool,
    pub round_index: u16,
}

impl PrePoll {
    pub const SIZE: usize = PREPOLL_PAYLOAD_LEN;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.write_u32::<BigEndian>(self.session_id).unwrap();
        buf.write_u32::<BigEndian>(self.sts_index).unwrap();
        buf.write_u16::<BigEndian>(self.block_index).unwrap();
        buf.push(self.hop_flag as u8);
        buf.write_u16::<BigEndian>(self.round_index).unwrap();
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::SIZE {
            return Err(CodecError::TooShort {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            session_id: cursor.read_u32::<BigEndian>()?,
            sts_index: cursor.read_u32::<BigEndian>()?,
            block_index: cursor.read_u16::<BigEndian>()?,
            hop_flag: cursor.read_u8()? != 0,
            round_index: cursor.read_u16::<BigEndian>()?,
        })
    }
}

/// One responder's result inside a FinalData payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderRecord {
    pub node_index: u8,
    pub timestamp: u32,
    pub uncertainty: u8,
    pub status: u8,
}

/// FinalData payload: closes the round with the initiator's final
/// transmit time and every responder that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalData {
    pub session_id: u32,
    pub block_index: u16,
    pub hop_flag: bool,
    pub round_index: u16,
    pub final_sts_index: u32,
    pub final_tx_timestamp: u64,
    pub records: Vec<ResponderRecord>,
}

impl FinalData {
    pub fn wire_len(&self) -> usize {
        FINAL_DATA_FIXED_LEN + self.records.len() * RESPONDER_RECORD_LEN
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        buf.write_u32::<BigEndian>(self.session_id).unwrap();
        buf.write_u16::<BigEndian>(self.block_index).unwrap();
        buf.push(self.hop_flag as u8);
        buf.write_u16::<BigEndian>(self.round_index).unwrap();
        buf.write_u32::<BigEndian>(self.final_sts_index).unwrap();
        buf.write_u64::<BigEndian>(self.final_tx_timestamp).unwrap();
        buf.push(self.records.len() as u8);
        for rec in &self.records {
            buf.push(rec.node_index);
            buf.write_u32::<BigEndian>(rec.timestamp).unwrap();
            buf.push(rec.uncertainty);
            buf.push(rec.status);
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < FINAL_DATA_FIXED_LEN {
            return Err(CodecError::TooShort {
                expected: FINAL_DATA_FIXED_LEN,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let session_id = cursor.read_u32::<BigEndian>()?;
        let block_index = cursor.read_u16::<BigEndian>()?;
        let hop_flag = cursor.read_u8()? != 0;
        let round_index = cursor.read_u16::<BigEndian>()?;
        let final_sts_index = cursor.read_u32::<BigEndian>()?;
        let final_tx_timestamp = cursor.read_u64::<BigEndian>()?;

        let n_records = cursor.read_u8()? as usize;
        if n_records > MAX_NB_RESPONDERS {
            return Err(CodecError::Malformed {
                field: "n_records",
                expected: MAX_NB_RESPONDERS as u32,
                actual: n_records as u32,
            });
        }
        let needed = FINAL_DATA_FIXED_LEN + n_records * RESPONDER_RECORD_LEN;
        if data.len() < needed {
            return Err(CodecError::TooShort {
                expected: needed,
                actual: data.len(),
            });
        }
        let mut records = Vec::with_capacity(n_records);
        for _ in 0..n_records {
            records.push(ResponderRecord {
                node_index: cursor.read_u8()?,
                timestamp: cursor.read_u32::<BigEndian>()?,
                uncertainty: cursor.read_u8()?,
                status: cursor.read_u8()?,
            });
        }

        Ok(Self {
            session_id,
            block_index,
            hop_flag,
            round_index,
            final_sts_index,
            final_tx_timestamp,
            records,
        })
    }
}
