//! Sensirion I2C word framing.
//!
//! Every 16-bit word on the wire is sent big-endian followed by one CRC-8
//! byte (polynomial 0x31, init 0xFF, no reflection, no final XOR).  The
//! checksum table is built at compile time.

use crate::error::DriverError;

const CRC8_POLY: u8 = 0x31;
const CRC8_INIT: u8 = 0xFF;

/// Bytes per framed word: two data bytes plus the CRC.
pub const WORD_LEN: usize = 3;

/// Sentinel for a missing unsigned value.
pub const MISSING_U16: u16 = 0xFFFF;
/// Sentinel for a missing signed value.
pub const MISSING_I16: i16 = 0x7FFF;

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = build_crc8_table();

/// CRC-8 over an arbitrary byte slice.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(CRC8_INIT, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

/// Frame `words` into `out` (3 bytes each).  Returns the framed length.
pub fn encode_words(words: &[u16], out: &mut [u8]) -> Result<usize, DriverError> {
    let len = words.len() * WORD_LEN;
    if out.len() < len {
        return Err(DriverError::InvalidResponse);
    }
    for (word, chunk) in words.iter().zip(out.chunks_exact_mut(WORD_LEN)) {
        let [hi, lo] = word.to_be_bytes();
        chunk[0] = hi;
        chunk[1] = lo;
        chunk[2] = crc8(&[hi, lo]);
    }
    Ok(len)
}

/// Decode framed bytes into `out`.  The whole transaction fails on the
/// first bad CRC or when the length is not a whole number of words.
pub fn decode_words(bytes: &[u8], out: &mut [u16]) -> Result<usize, DriverError> {
    if bytes.len() % WORD_LEN != 0 || bytes.len() / WORD_LEN > out.len() {
        return Err(DriverError::InvalidResponse);
    }
    for (chunk, word) in bytes.chunks_exact(WORD_LEN).zip(out.iter_mut()) {
        if crc8(&chunk[..2]) != chunk[2] {
            return Err(DriverError::Crc);
        }
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(bytes.len() / WORD_LEN)
}

/// Scale an unsigned word, mapping the 0xFFFF sentinel to `None`.
pub fn scaled_u16(raw: u16, divisor: f32) -> Option<f32> {
    (raw != MISSING_U16).then(|| f32::from(raw) / divisor)
}

/// Scale a signed word, mapping the 0x7FFF sentinel to `None`.
pub fn scaled_i16(raw: u16, divisor: f32) -> Option<f32> {
    let v = raw as i16;
    (v != MISSING_I16).then(|| f32::from(v) / divisor)
}
