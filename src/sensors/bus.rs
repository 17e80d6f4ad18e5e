//! Shared I2C transport for every sensor driver.
//!
//! The hub owns exactly one [`SensorBus`], so at most one transaction is in
//! flight at any time.  Command-specific settle times are applied here
//! through the injected `DelayNs` so drivers stay host-testable.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};
use log::debug;

use super::sensirion::{self, WORD_LEN};
use crate::error::DriverError;

/// Largest parameter list any command sends (SEN66 offset / VOC state).
pub const MAX_PARAM_WORDS: usize = 4;
/// Largest response any command reads (SEN66 measured values).
pub const MAX_READ_WORDS: usize = 9;

pub struct SensorBus<I, D> {
    i2c: I,
    delay: D,
}

impl<I: I2c, D: DelayNs> SensorBus<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self { i2c, delay }
    }

    fn map_err(addr: u8, e: &I::Error) -> DriverError {
        let kind = e.kind();
        debug!("I2C 0x{:02X}: {:?}", addr, kind);
        match kind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => DriverError::NotPresent,
            _ => DriverError::Bus,
        }
    }

    /// Zero-length write: true when the address acknowledges.
    pub fn probe(&mut self, addr: u8) -> bool {
        self.i2c.write(addr, &[]).is_ok()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        if ms > 0 {
            self.delay.delay_ms(ms);
        }
    }

    pub fn write_raw(&mut self, addr: u8, bytes: &[u8]) -> Result<(), DriverError> {
        self.i2c.write(addr, bytes).map_err(|e| Self::map_err(addr, &e))
    }

    pub fn read_raw(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), DriverError> {
        self.i2c.read(addr, buf).map_err(|e| Self::map_err(addr, &e))
    }

    /// Register-style access: write the register address, repeated start, read.
    pub fn write_read(&mut self, addr: u8, wr: &[u8], rd: &mut [u8]) -> Result<(), DriverError> {
        self.i2c
            .write_read(addr, wr, rd)
            .map_err(|e| Self::map_err(addr, &e))
    }

    /// Send a 16-bit Sensirion command with optional CRC-framed parameter
    /// words, then wait `settle_ms`.
    pub fn send_command(
        &mut self,
        addr: u8,
        cmd: u16,
        params: &[u16],
        settle_ms: u32,
    ) -> Result<(), DriverError> {
        if params.len() > MAX_PARAM_WORDS {
            return Err(DriverError::InvalidResponse);
        }
        let mut frame = [0u8; 2 + MAX_PARAM_WORDS * WORD_LEN];
        frame[..2].copy_from_slice(&cmd.to_be_bytes());
        let n = sensirion::encode_words(params, &mut frame[2..])?;
        self.write_raw(addr, &frame[..2 + n])?;
        self.delay_ms(settle_ms);
        Ok(())
    }

    /// Read `out.len()` CRC-framed words from a device that has already
    /// been sent its command.
    pub fn read_response(&mut self, addr: u8, out: &mut [u16]) -> Result<(), DriverError> {
        if out.len() > MAX_READ_WORDS {
            return Err(DriverError::InvalidResponse);
        }
        let mut raw = [0u8; MAX_READ_WORDS * WORD_LEN];
        let len = out.len() * WORD_LEN;
        self.read_raw(addr, &mut raw[..len])?;
        sensirion::decode_words(&raw[..len], out)?;
        Ok(())
    }

    /// Command-then-read in one call.
    pub fn read_words(
        &mut self,
        addr: u8,
        cmd: u16,
        settle_ms: u32,
        out: &mut [u16],
    ) -> Result<(), DriverError> {
        self.send_command(addr, cmd, &[], settle_ms)?;
        self.read_response(addr, out)
    }
}
