//! Bosch BMP280 barometric pressure driver (fallback pressure source).
//!
//! Normal mode with 1 s standby, x16 pressure / x2 temperature
//! oversampling and IIR filter 4.  Compensation uses the double-precision
//! formulas from the datasheet.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use super::bus::SensorBus;
use super::{DriverState, FailureCounter, SensorDriver};
use crate::error::DriverError;

pub const BMP280_ADDR: u8 = 0x76;

const REG_CALIB: u8 = 0x88;
const REG_CHIP_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_PRESS_MSB: u8 = 0xF7;

const CHIP_ID: u8 = 0x58;
const RESET_CODE: u8 = 0xB6;
/// t_sb 1000 ms, IIR filter 4.
const CONFIG: u8 = 0xA8;
/// osrs_t x2, osrs_p x16, normal mode.
const CTRL_MEAS: u8 = 0x57;

const RESET_DELAY_MS: u32 = 5;
pub const POLL_INTERVAL_MS: u64 = 1000;
const FAIL_LIMIT: u8 = 5;

/// Factory trimming parameters (registers 0x88..0x9F, little endian).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bmp280Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

impl Bmp280Calibration {
    pub fn parse(b: &[u8; 24]) -> Self {
        let u = |i: usize| u16::from_le_bytes([b[i], b[i + 1]]);
        let s = |i: usize| i16::from_le_bytes([b[i], b[i + 1]]);
        Self {
            t1: u(0),
            t2: s(2),
            t3: s(4),
            p1: u(6),
            p2: s(8),
            p3: s(10),
            p4: s(12),
            p5: s(14),
            p6: s(16),
            p7: s(18),
            p8: s(20),
            p9: s(22),
        }
    }

    /// Compensated `(pressure_pa, temperature_c)` from 20-bit ADC values.
    /// `None` when the trimming data would divide by zero.
    pub fn compensate(&self, adc_p: i32, adc_t: i32) -> Option<(f64, f64)> {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.t1);
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.t2);
        let d = adc_t / 131_072.0 - t1 / 8192.0;
        let var2 = d * d * f64::from(self.t3);
        let t_fine = var1 + var2;
        let temperature = t_fine / 5120.0;

        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.p6) / 32768.0;
        var2 += var1 * f64::from(self.p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.p4) * 65536.0;
        var1 = (f64::from(self.p3) * var1 * var1 / 524_288.0 + f64::from(self.p2) * var1)
            / 524_288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.p1);
        if var1 == 0.0 {
            return None;
        }
        let mut p = 1_048_576.0 - f64::from(adc_p);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        let var1 = f64::from(self.p9) * p * p / 2_147_483_648.0;
        let var2 = p * f64::from(self.p8) / 32768.0;
        p += (var1 + var2 + f64::from(self.p7)) / 16.0;
        Some((p, temperature))
    }
}

fn adc20(b: &[u8]) -> i32 {
    (i32::from(b[0]) << 12) | (i32::from(b[1]) << 4) | (i32::from(b[2]) >> 4)
}

pub struct Bmp280 {
    state: DriverState,
    failures: FailureCounter,
    calib: Bmp280Calibration,
    pressure_hpa: Option<f32>,
}

impl Default for Bmp280 {
    fn default() -> Self {
        Self::new()
    }
}

impl Bmp280 {
    pub fn new() -> Self {
        Self {
            state: DriverState::default(),
            failures: FailureCounter::new(FAIL_LIMIT),
            calib: Bmp280Calibration::default(),
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

    fn init<I: I2c, D: DelayNs>(&mut self, bus: &mut SensorBus<I, D>) -> Result<(), DriverError> {
        let mut id = [0u8; 1];
        bus.write_read(BMP280_ADDR, &[REG_CHIP_ID], &mut id)?;
        if id[0] != CHIP_ID {
            debug!("BMP280: unexpected chip id 0x{:02X}", id[0]);
            return Err(DriverError::InvalidResponse);
        }
        bus.write_raw(BMP280_ADDR, &[REG_RESET, RESET_CODE])?;
        bus.delay_ms(RESET_DELAY_MS);

        let mut raw = [0u8; 24];
        bus.write_read(BMP280_ADDR, &[REG_CALIB], &mut raw)?;
        self.calib = Bmp280Calibration::parse(&raw);
        if self.calib.p1 == 0 {
            return Err(DriverError::InvalidResponse);
        }

        // Config must be written while in sleep mode, i.e. before ctrl_meas.
        bus.write_raw(BMP280_ADDR, &[REG_CONFIG, CONFIG])?;
        bus.write_raw(BMP280_ADDR, &[REG_CTRL_MEAS, CTRL_MEAS])
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for Bmp280 {
    fn begin(&mut self) {
        self.state = DriverState::default();
        self.failures.reset();
        self.invalidate();
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        if !bus.probe(BMP280_ADDR) {
            return Err(DriverError::NotPresent);
        }
        self.init(bus)?;
        self.state.present = true;
        self.state.enter_measuring(now_ms);
        info!("BMP280: normal mode started");
        Ok(())
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        if !self.state.measuring || !self.state.poll_due(now_ms, POLL_INTERVAL_MS) {
            return false;
        }
        self.state.last_poll_ms = Some(now_ms);

        let mut raw = [0u8; 6];
        let result = bus
            .write_read(BMP280_ADDR, &[REG_PRESS_MSB], &mut raw)
            .and_then(|()| {
                self.calib
                    .compensate(adc20(&raw[0..3]), adc20(&raw[3..6]))
                    .ok_or(DriverError::InvalidResponse)
            });

        match result {
            Ok((pa, _)) => {
                self.pressure_hpa = Some((pa / 100.0) as f32);
                self.state.last_success_ms = Some(now_ms);
                self.failures.reset();
                true
            }
            Err(e) => {
                if self.failures.record() {
                    warn!("BMP280: {} consecutive read failures ({})", FAIL_LIMIT, e);
                }
                false
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.state.measuring && self.pressure_hpa.is_some()
    }
}
