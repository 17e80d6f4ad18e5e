//! On-flash layout of the pressure history.
//!
//! ```text
//!   offset  size  field
//!   0       4     magic   "SIHP" (0x5048_4953, little endian)
//!   4       2     version
//!   6       4     epoch   wall-clock secs of the newest sample, 0 = unknown
//!   10      2     index   next write slot
//!   12      2     count   live samples
//!   14      1152  288 × f32 samples
//! ```
//!
//! All fields little endian.

use core::fmt;

use super::CAPACITY;

pub const MAGIC: u32 = 0x5048_4953;
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 14;
pub const RECORD_LEN: usize = HEADER_LEN + CAPACITY * 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordError {
    Length(usize),
    Magic(u32),
    Version(u16),
    Bounds { index: u16, count: u16 },
    NonFinite(usize),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(n) => write!(f, "length {} (expected {})", n, RECORD_LEN),
            Self::Magic(m) => write!(f, "bad magic 0x{:08X}", m),
            Self::Version(v) => write!(f, "unsupported version {}", v),
            Self::Bounds { index, count } => write!(f, "index {} / count {} out of range", index, count),
            Self::NonFinite(slot) => write!(f, "non-finite sample in slot {}", slot),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub epoch: u32,
    pub index: u16,
    pub count: u16,
    pub samples: [f32; CAPACITY],
}

impl HistoryRecord {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[6..10].copy_from_slice(&self.epoch.to_le_bytes());
        out[10..12].copy_from_slice(&self.index.to_le_bytes());
        out[12..14].copy_from_slice(&self.count.to_le_bytes());
        for (chunk, s) in out[HEADER_LEN..].chunks_exact_mut(4).zip(self.samples) {
            chunk.copy_from_slice(&s.to_le_bytes());
        }
        out
    }

    /// Parse and validate a stored record.  Only live slots must be finite.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_LEN {
            return Err(RecordError::Length(bytes.len()));
        }
        let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

        let magic = u32_at(0);
        if magic != MAGIC {
            return Err(RecordError::Magic(magic));
        }
        let version = u16_at(4);
        if version != VERSION {
            return Err(RecordError::Version(version));
        }
        let epoch = u32_at(6);
        let index = u16_at(10);
        let count = u16_at(12);
        if usize::from(index) >= CAPACITY || usize::from(count) > CAPACITY {
            return Err(RecordError::Bounds { index, count });
        }

        let mut samples = [0.0f32; CAPACITY];
        for (s, chunk) in samples.iter_mut().zip(bytes[HEADER_LEN..].chunks_exact(4)) {
            *s = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        for k in 0..usize::from(count) {
            let slot = (usize::from(index) + CAPACITY - 1 - k) % CAPACITY;
            if !samples[slot].is_finite() {
                return Err(RecordError::NonFinite(slot));
            }
        }

        Ok(Self {
            epoch,
            index,
            count,
            samples,
        })
    }
}
