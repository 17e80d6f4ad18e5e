//! Infineon DPS310 barometric pressure driver (primary pressure source).
//!
//! Runs in continuous pressure + temperature mode at 1 Hz with 8x pressure
//! oversampling; each poll waits for both ready flags, then reads the six
//! result registers and applies the factory coefficients.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use super::bus::SensorBus;
use super::{DriverState, FailureCounter, SensorDriver};
use crate::error::DriverError;

pub const DPS310_ADDR: u8 = 0x77;

const REG_PSR_B2: u8 = 0x00;
const REG_PRS_CFG: u8 = 0x06;
const REG_TMP_CFG: u8 = 0x07;
const REG_MEAS_CFG: u8 = 0x08;
const REG_CFG_REG: u8 = 0x09;
const REG_RESET: u8 = 0x0C;
const REG_PROD_ID: u8 = 0x0D;
const REG_COEF: u8 = 0x10;
const REG_COEF_SRC: u8 = 0x28;

const PROD_ID: u8 = 0x10;
const RESET_CODE: u8 = 0x09;
const COEF_RDY: u8 = 0x80;
const SENSOR_RDY: u8 = 0x40;
const TMP_EXT: u8 = 0x80;
const PRS_RDY: u8 = 0x10;
const TMP_RDY: u8 = 0x20;

/// 1 measurement/s, 8x oversampling.
const PRS_CFG: u8 = 0x03;
/// 1 measurement/s, single sample.
const TMP_CFG: u8 = 0x00;
const MODE_CONTINUOUS_BOTH: u8 = 0x07;

/// Compensation scale factors for the configured oversampling rates.
const KP_8X: f32 = 7_864_320.0;
const KT_1X: f32 = 524_288.0;

const RESET_DELAY_MS: u32 = 40;
const READY_POLL_MS: u32 = 10;
const READY_ATTEMPTS: u8 = 10;

pub const POLL_INTERVAL_MS: u64 = 1000;
const FAIL_LIMIT: u8 = 5;

/// Factory calibration coefficients, sign-extended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dps310Coefficients {
    pub c0: i32,
    pub c1: i32,
    pub c00: i32,
    pub c10: i32,
    pub c01: i32,
    pub c11: i32,
    pub c20: i32,
    pub c21: i32,
    pub c30: i32,
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn be24(b: &[u8]) -> i32 {
    sign_extend(
        (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]),
        24,
    )
}

impl Dps310Coefficients {
    /// Unpack the 18-byte coefficient block starting at 0x10.
    pub fn parse(b: &[u8; 18]) -> Self {
        let u = |i: usize| u32::from(b[i]);
        let i16_at = |i: usize| i32::from(i16::from_be_bytes([b[i], b[i + 1]]));
        Self {
            c0: sign_extend((u(0) << 4) | (u(1) >> 4), 12),
            c1: sign_extend(((u(1) & 0x0F) << 8) | u(2), 12),
            c00: sign_extend((u(3) << 12) | (u(4) << 4) | (u(5) >> 4), 20),
            c10: sign_extend(((u(5) & 0x0F) << 16) | (u(6) << 8) | u(7), 20),
            c01: i16_at(8),
            c11: i16_at(10),
            c20: i16_at(12),
            c21: i16_at(14),
            c30: i16_at(16),
        }
    }

    /// Compensated `(pressure_pa, temperature_c)` from raw 24-bit results.
    pub fn compensate(&self, raw_p: i32, raw_t: i32) -> (f32, f32) {
        let t_sc = raw_t as f32 / KT_1X;
        let p_sc = raw_p as f32 / KP_8X;
        let temperature = self.c0 as f32 * 0.5 + self.c1 as f32 * t_sc;
        let pressure = self.c00 as f32
            + p_sc * (self.c10 as f32 + p_sc * (self.c20 as f32 + p_sc * self.c30 as f32))
            + t_sc * self.c01 as f32
            + t_sc * p_sc * (self.c11 as f32 + p_sc * self.c21 as f32);
        (pressure, temperature)
    }
}

pub struct Dps310 {
    state: DriverState,
    failures: FailureCounter,
    coef: Dps310Coefficients,
    pressure_hpa: Option<f32>,
}

impl Default for Dps310 {
    fn default() -> Self {
        Self::new()
    }
}

impl Dps310 {
    pub fn new() -> Self {
        Self {
            state: DriverState::default(),
            failures: FailureCounter::new(FAIL_LIMIT),
            coef: Dps310Coefficients::default(),
            pressure_hpa: None,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    pub fn pressure_hpa(&self) -> Option<f32> {
        self.pressure_hpa
    }

    pub fn invalidate(&mut self) {
        self.pressure_hpa = None;
    }

    fn read_reg<I: I2c, D: DelayNs>(bus: &mut SensorBus<I, D>, reg: u8) -> Result<u8, DriverError> {
        let mut v = [0u8; 1];
        bus.write_read(DPS310_ADDR, &[reg], &mut v)?;
        Ok(v[0])
    }

    fn write_reg<I: I2c, D: DelayNs>(
        bus: &mut SensorBus<I, D>,
        reg: u8,
        value: u8,
    ) -> Result<(), DriverError> {
        bus.write_raw(DPS310_ADDR, &[reg, value])
    }

    fn init<I: I2c, D: DelayNs>(&mut self, bus: &mut SensorBus<I, D>) -> Result<(), DriverError> {
        Self::write_reg(bus, REG_RESET, RESET_CODE)?;
        bus.delay_ms(RESET_DELAY_MS);

        let id = Self::read_reg(bus, REG_PROD_ID)?;
        if id != PROD_ID {
            debug!("DPS310: unexpected product id 0x{:02X}", id);
            return Err(DriverError::InvalidResponse);
        }

        let mut ready = false;
        for _ in 0..READY_ATTEMPTS {
            let meas = Self::read_reg(bus, REG_MEAS_CFG)?;
            if meas & (COEF_RDY | SENSOR_RDY) == (COEF_RDY | SENSOR_RDY) {
                ready = true;
                break;
            }
            bus.delay_ms(READY_POLL_MS);
        }
        if !ready {
            return Err(DriverError::NotPresent);
        }

        let mut raw = [0u8; 18];
        bus.write_read(DPS310_ADDR, &[REG_COEF], &mut raw)?;
        self.coef = Dps310Coefficients::parse(&raw);

        // Temperature must be measured with the sensor the coefficients were trimmed on.
        let src = Self::read_reg(bus, REG_COEF_SRC)? & TMP_EXT;
        Self::write_reg(bus, REG_PRS_CFG, PRS_CFG)?;
        Self::write_reg(bus, REG_TMP_CFG, TMP_CFG | src)?;
        Self::write_reg(bus, REG_CFG_REG, 0x00)?;
        Self::write_reg(bus, REG_MEAS_CFG, MODE_CONTINUOUS_BOTH)
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for Dps310 {
    fn begin(&mut self) {
        self.state = DriverState::default();
        self.failures.reset();
        self.invalidate();
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        if !bus.probe(DPS310_ADDR) {
            return Err(DriverError::NotPresent);
        }
        self.init(bus)?;
        self.state.present = true;
        self.state.enter_measuring(now_ms);
        info!("DPS310: continuous measurement started");
        Ok(())
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        if !self.state.measuring || !self.state.poll_due(now_ms, POLL_INTERVAL_MS) {
            return false;
        }
        self.state.last_poll_ms = Some(now_ms);

        // Result registers hold zeros (or the previous result) until a
        // conversion of each kind has finished.
        let result = Self::read_reg(bus, REG_MEAS_CFG).and_then(|meas| {
            if meas & (PRS_RDY | TMP_RDY) != (PRS_RDY | TMP_RDY) {
                return Ok(None);
            }
            let mut raw = [0u8; 6];
            bus.write_read(DPS310_ADDR, &[REG_PSR_B2], &mut raw)?;
            Ok(Some(raw))
        });
        match result {
            Ok(None) => {
                debug!("DPS310: conversion not ready");
                false
            }
            Ok(Some(raw)) => {
                let (pa, _) = self.coef.compensate(be24(&raw[0..3]), be24(&raw[3..6]));
                self.pressure_hpa = Some(pa / 100.0);
                self.state.last_success_ms = Some(now_ms);
                self.failures.reset();
                true
            }
            Err(e) => {
                if self.failures.record() {
                    warn!("DPS310: {} consecutive read failures ({})", FAIL_LIMIT, e);
                }
                false
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.state.measuring && self.pressure_hpa.is_some()
    }
}
