//! Sensirion SFA30 formaldehyde driver.
//!
//! Same word framing as the SEN66; a single three-word read returns HCHO,
//! humidity and temperature.  Only HCHO reaches the snapshot; the SEN66 is
//! the authoritative climate source.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use super::bus::SensorBus;
use super::sensirion::scaled_i16;
use super::{DriverState, FailureCounter, SensorDriver};
use crate::error::DriverError;

pub const SFA30_ADDR: u8 = 0x5D;

const CMD_START: u16 = 0x0006;
const CMD_READ_VALUES: u16 = 0x0327;
const CMD_DEVICE_RESET: u16 = 0xD304;

const START_DELAY_MS: u32 = 1;
const READ_DELAY_MS: u32 = 5;
const RESET_DELAY_MS: u32 = 100;

pub const POLL_INTERVAL_MS: u64 = 2000;
pub const HCHO_WARMUP_MS: u64 = 10_000;
pub const STALE_MS: u64 = 60_000;
const FAIL_LIMIT: u8 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sfa30Reading {
    pub hcho_ppb: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub temperature_c: Option<f32>,
}

impl Sfa30Reading {
    pub fn from_words(w: &[u16; 3]) -> Self {
        Self {
            hcho_ppb: scaled_i16(w[0], 5.0),
            humidity_pct: scaled_i16(w[1], 100.0),
            temperature_c: scaled_i16(w[2], 200.0),
        }
    }
}

pub struct Sfa30 {
    state: DriverState,
    failures: FailureCounter,
    reading: Sfa30Reading,
    data_valid: bool,
}

impl Default for Sfa30 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sfa30 {
    pub fn new() -> Self {
        Self {
            state: DriverState::default(),
            failures: FailureCounter::new(FAIL_LIMIT),
            reading: Sfa30Reading::default(),
            data_valid: false,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn reading(&self) -> &Sfa30Reading {
        &self.reading
    }

    /// HCHO is reported only once the electrochemical cell has settled.
    pub fn hcho_ready(&self, now_ms: u64) -> bool {
        self.state.warmed_up(now_ms, HCHO_WARMUP_MS)
    }

    /// Soft reset of a stalled sensor.  The driver drops to idle even when
    /// the command is lost, so the next `start()` begins a fresh warm-up.
    pub fn device_reset<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<(), DriverError> {
        self.state.leave_measuring();
        self.data_valid = false;
        bus.send_command(SFA30_ADDR, CMD_DEVICE_RESET, &[], RESET_DELAY_MS)
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for Sfa30 {
    fn begin(&mut self) {
        self.state = DriverState::default();
        self.failures.reset();
        self.reading = Sfa30Reading::default();
        self.data_valid = false;
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        if !bus.probe(SFA30_ADDR) {
            return Err(DriverError::NotPresent);
        }
        bus.send_command(SFA30_ADDR, CMD_START, &[], START_DELAY_MS)?;
        self.state.present = true;
        self.state.enter_measuring(now_ms);
        info!("SFA30: measurement started");
        Ok(())
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        if !self.state.measuring || !self.state.poll_due(now_ms, POLL_INTERVAL_MS) {
            return false;
        }
        self.state.last_poll_ms = Some(now_ms);

        let mut w = [0u16; 3];
        match bus.read_words(SFA30_ADDR, CMD_READ_VALUES, READ_DELAY_MS, &mut w) {
            Ok(()) => {
                self.reading = Sfa30Reading::from_words(&w);
                self.data_valid = self.reading.hcho_ppb.is_some();
                self.state.last_success_ms = Some(now_ms);
                self.failures.reset();
                true
            }
            Err(e) => {
                if self.failures.record() {
                    warn!("SFA30: {} consecutive read failures ({})", FAIL_LIMIT, e);
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
