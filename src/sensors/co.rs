//! Electrochemical CO module driver (9-byte gas-module protocol over I2C).
//!
//! Frame layout, both directions:
//!
//! ```text
//!   [0xFF] [0x01|cmd echo] [cmd|data…] … [checksum]
//!     0          1             2 .. 7         8
//! ```
//!
//! The checksum is the two's complement of the byte sum over indices 1..=7.
//! Some module firmware revisions only sum 1..=6 in their responses, so
//! both variants are accepted on receive.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use super::bus::SensorBus;
use super::{DriverState, FailureCounter, SensorDriver};
use crate::error::DriverError;

pub const CO_ADDR: u8 = 0x74;
pub const FRAME_LEN: usize = 9;

const START_BYTE: u8 = 0xFF;
const ADDR_BYTE: u8 = 0x01;
const CMD_SET_MODE: u8 = 0x78;
const CMD_READ_GAS: u8 = 0x86;
const MODE_PASSIVE: u8 = 0x04;
pub const GAS_TYPE_CO: u8 = 0x04;

const RESPONSE_DELAY_MS: u32 = 100;
pub const POLL_INTERVAL_MS: u64 = 2000;
pub const CO_WARMUP_MS: u64 = 180_000;
pub const STALE_MS: u64 = 30_000;
pub const CO_MAX_PPM: f32 = 1000.0;
const CO_FAIL_THRESHOLD: u8 = 3;

/// Two's-complement checksum over `frame[1..end]`.
fn sum_checksum(frame: &[u8; FRAME_LEN], end: usize) -> u8 {
    let sum = frame[1..end]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

/// Checksum as transmitted by the host (bytes 1..=7).
pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    sum_checksum(frame, 8)
}

/// Build a request frame.
pub fn build_frame(cmd: u8, args: [u8; 5]) -> [u8; FRAME_LEN] {
    let mut f = [0u8; FRAME_LEN];
    f[0] = START_BYTE;
    f[1] = ADDR_BYTE;
    f[2] = cmd;
    f[3..8].copy_from_slice(&args);
    f[8] = checksum(&f);
    f
}

/// Check start byte, command echo and either checksum variant.
pub fn verify_response(frame: &[u8; FRAME_LEN], cmd: u8) -> Result<(), DriverError> {
    if frame[0] != START_BYTE || frame[1] != cmd {
        return Err(DriverError::InvalidResponse);
    }
    if frame[8] == sum_checksum(frame, 8) || frame[8] == sum_checksum(frame, 7) {
        Ok(())
    } else {
        Err(DriverError::Crc)
    }
}

/// One decoded gas-concentration response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoSample {
    pub ppm: f32,
    pub gas_type: u8,
}

/// Decode a verified-or-not concentration response.
pub fn decode_concentration(frame: &[u8; FRAME_LEN]) -> Result<CoSample, DriverError> {
    verify_response(frame, CMD_READ_GAS)?;
    let raw = f32::from(u16::from_be_bytes([frame[2], frame[3]]));
    let scale = match frame[5] {
        0 => 1.0,
        1 => 0.1,
        2 => 0.01,
        _ => return Err(DriverError::InvalidResponse),
    };
    Ok(CoSample {
        ppm: raw * scale,
        gas_type: frame[4],
    })
}

/// Reject impossible concentrations, clamp the rest to the cell's range.
pub fn validate_ppm(ppm: f32) -> Option<f32> {
    if !ppm.is_finite() || ppm < 0.0 {
        return None;
    }
    Some(ppm.min(CO_MAX_PPM))
}

pub struct CoSensor {
    state: DriverState,
    failures: FailureCounter,
    ppm: Option<f32>,
    data_valid: bool,
    gas_mismatch_logged: bool,
}

impl Default for CoSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl CoSensor {
    pub fn new() -> Self {
        Self {
            state: DriverState::default(),
            failures: FailureCounter::new(CO_FAIL_THRESHOLD),
            ppm: None,
            data_valid: false,
            gas_mismatch_logged: false,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// Latest validated concentration.
    pub fn ppm(&self) -> Option<f32> {
        if self.data_valid { self.ppm } else { None }
    }

    pub fn warmed_up(&self, now_ms: u64) -> bool {
        self.state.warmed_up(now_ms, CO_WARMUP_MS)
    }

    pub fn invalidate(&mut self) {
        self.data_valid = false;
    }

    fn transact<I: I2c, D: DelayNs>(
        bus: &mut SensorBus<I, D>,
        cmd: u8,
        args: [u8; 5],
    ) -> Result<[u8; FRAME_LEN], DriverError> {
        bus.write_raw(CO_ADDR, &build_frame(cmd, args))?;
        bus.delay_ms(RESPONSE_DELAY_MS);
        let mut resp = [0u8; FRAME_LEN];
        bus.read_raw(CO_ADDR, &mut resp)?;
        Ok(resp)
    }

    fn handle_sample(&mut self, sample: CoSample) -> Result<(), DriverError> {
        if sample.gas_type != GAS_TYPE_CO {
            if !self.gas_mismatch_logged {
                warn!(
                    "CO: module reports gas type 0x{:02X}, expected CO",
                    sample.gas_type
                );
                self.gas_mismatch_logged = true;
            }
            self.data_valid = false;
            return Err(DriverError::InvalidResponse);
        }
        if self.gas_mismatch_logged {
            info!("CO: gas type confirmed");
            self.gas_mismatch_logged = false;
        }
        let ppm = validate_ppm(sample.ppm).ok_or(DriverError::InvalidResponse)?;
        self.ppm = Some(ppm);
        self.data_valid = true;
        Ok(())
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for CoSensor {
    fn begin(&mut self) {
        self.state = DriverState::default();
        self.failures.reset();
        self.ppm = None;
        self.data_valid = false;
        self.gas_mismatch_logged = false;
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        if !bus.probe(CO_ADDR) {
            return Err(DriverError::NotPresent);
        }
        if !self.state.present {
            // Best effort: modules already in passive mode answer reads either way.
            let mode = Self::transact(bus, CMD_SET_MODE, [MODE_PASSIVE, 0, 0, 0, 0])
                .and_then(|resp| verify_response(&resp, CMD_SET_MODE));
            if let Err(e) = mode {
                warn!("CO: passive mode request failed ({})", e);
            }
            info!("CO: sensor detected, warming up");
        }
        self.state.present = true;
        self.state.enter_measuring(now_ms);
        Ok(())
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        if !self.state.measuring || !self.state.poll_due(now_ms, POLL_INTERVAL_MS) {
            return false;
        }
        self.state.last_poll_ms = Some(now_ms);

        let result = Self::transact(bus, CMD_READ_GAS, [0; 5])
            .and_then(|resp| decode_concentration(&resp))
            .and_then(|sample| self.handle_sample(sample));

        match result {
            Ok(()) => {
                self.state.last_success_ms = Some(now_ms);
                self.failures.reset();
                true
            }
            Err(e) => {
                if self.failures.record() {
                    warn!("CO: {} consecutive failures ({}), data invalid", CO_FAIL_THRESHOLD, e);
                    self.data_valid = false;
                }
                false
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.state.measuring && self.data_valid
    }
}
