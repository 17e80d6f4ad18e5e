//! Sensirion SEN66 multi-gas / particulate driver.
//!
//! Measures PM1.0/2.5/4.0/10, temperature, humidity, VOC and NOx indices and
//! CO2 over a CRC-framed command protocol (see [`super::sensirion`]).
//!
//! ```text
//!   Idle ──start()──▶ Measuring ──stop()/force_idle()──▶ Idle
//!                        │
//!                        └─ FRC / ASC / reset: force idle, apply, restart
//! ```
//!
//! The VOC algorithm state is persisted as an 8-byte blob so the index does
//! not relearn its baseline after every reboot.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use super::bus::SensorBus;
use super::sensirion::{scaled_i16, scaled_u16};
use super::smoothing::Co2Smoother;
use super::{DriverState, FailureCounter, SensorDriver};
use crate::app::ports::{FileSystem, StorageError};
use crate::error::{DriverError, Error};
use crate::storage::CAL_BLOB_PATH;
use crate::storage::durable::DurableStore;

pub const SEN66_ADDR: u8 = 0x6B;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

const CMD_START: u16 = 0x0021;
const CMD_STOP: u16 = 0x0104;
const CMD_DATA_READY: u16 = 0x0202;
const CMD_READ_VALUES: u16 = 0x0300;
const CMD_DEVICE_STATUS: u16 = 0xD206;
const CMD_FORCED_RECAL: u16 = 0x6707;
const CMD_CO2_ASC: u16 = 0x6711;
const CMD_AMBIENT_PRESSURE: u16 = 0x6720;
const CMD_VOC_STATE: u16 = 0x6181;
const CMD_TEMP_OFFSET: u16 = 0x60B2;
const CMD_DEVICE_RESET: u16 = 0xD304;

const START_DELAY_MS: u32 = 50;
const STOP_DELAY_MS: u32 = 1000;
const CMD_DELAY_MS: u32 = 20;
const FRC_DELAY_MS: u32 = 500;
const RESET_DELAY_MS: u32 = 1200;

// ---------------------------------------------------------------------------
// Timing and limits
// ---------------------------------------------------------------------------

pub const POLL_INTERVAL_MS: u64 = 1000;
/// VOC/NOx indices are meaningless until the gas algorithm has run this long.
pub const GAS_WARMUP_MS: u64 = 300_000;
pub const AMBIENT_PRESSURE_INTERVAL_MS: u64 = 600_000;
pub const CAL_BLOB_SAVE_INTERVAL_MS: u64 = 3_600_000;
pub const VOC_STATE_LEN: usize = 8;

const AMBIENT_PRESSURE_MIN_HPA: f32 = 700.0;
const AMBIENT_PRESSURE_MAX_HPA: f32 = 1200.0;
const AMBIENT_FAIL_LIMIT: u8 = 3;
const POLL_FAIL_LIMIT: u8 = 5;
const STOP_ATTEMPTS: u8 = 3;
const ASC_VERIFY_ATTEMPTS: u8 = 5;
const FRC_FAILED: u16 = 0xFFFF;
const TEMP_SCALE: f32 = 200.0;

/// One decoded measurement.  `None` marks a sentinel word from the device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sen66Reading {
    pub pm1_0: Option<f32>,
    pub pm2_5: Option<f32>,
    pub pm4_0: Option<f32>,
    pub pm10_0: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub temperature_c: Option<f32>,
    pub voc_index: Option<f32>,
    pub nox_index: Option<f32>,
    pub co2_ppm: Option<f32>,
}

impl Sen66Reading {
    /// Decode the nine words of a "read measured values" response.
    pub fn from_words(w: &[u16; 9]) -> Self {
        Self {
            pm1_0: scaled_u16(w[0], 10.0),
            pm2_5: scaled_u16(w[1], 10.0),
            pm4_0: scaled_u16(w[2], 10.0),
            pm10_0: scaled_u16(w[3], 10.0),
            humidity_pct: scaled_i16(w[4], 100.0),
            temperature_c: scaled_i16(w[5], TEMP_SCALE),
            voc_index: scaled_i16(w[6], 10.0),
            nox_index: scaled_i16(w[7], 10.0),
            co2_ppm: scaled_u16(w[8], 1.0),
        }
    }
}

/// Raw 32-bit device status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sen66Status(pub u32);

impl Sen66Status {
    const FAN_SPEED_WARNING: u32 = 1 << 21;
    const ERROR_MASK: u32 = 0x0000_FFFF;

    pub fn fan_speed_warning(self) -> bool {
        self.0 & Self::FAN_SPEED_WARNING != 0
    }

    pub fn has_error(self) -> bool {
        self.0 & Self::ERROR_MASK != 0
    }
}

pub struct Sen66 {
    state: DriverState,
    failures: FailureCounter,
    ambient_failures: FailureCounter,
    reading: Sen66Reading,
    co2: Co2Smoother,
    data_valid: bool,
    /// Offset currently programmed into the device.
    hw_offset_c: f32,
    /// Offset the user asked for.
    user_offset_c: f32,
    pending_voc_state: Option<[u8; VOC_STATE_LEN]>,
    last_voc_save_ms: Option<u64>,
    last_ambient_ms: Option<u64>,
}

impl Default for Sen66 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sen66 {
    pub fn new() -> Self {
        Self {
            state: DriverState::default(),
            failures: FailureCounter::new(POLL_FAIL_LIMIT),
            ambient_failures: FailureCounter::new(AMBIENT_FAIL_LIMIT),
            reading: Sen66Reading::default(),
            co2: Co2Smoother::new(),
            data_valid: false,
            hw_offset_c: 0.0,
            user_offset_c: 0.0,
            pending_voc_state: None,
            last_voc_save_ms: None,
            last_ambient_ms: None,
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// Latest compensated, smoothed measurement.
    pub fn reading(&self) -> &Sen66Reading {
        &self.reading
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    pub fn is_measuring(&self) -> bool {
        self.state.measuring
    }

    pub fn gas_ready(&self, now_ms: u64) -> bool {
        self.state.warmed_up(now_ms, GAS_WARMUP_MS)
    }

    pub fn schedule_retry(&mut self, at_ms: u64) {
        self.state.retry_at_ms = at_ms;
    }

    pub fn retry_due(&self, now_ms: u64) -> bool {
        now_ms >= self.state.retry_at_ms
    }

    /// `(hardware, user)` temperature offsets in Celsius.
    pub fn temperature_offsets(&self) -> (f32, f32) {
        (self.hw_offset_c, self.user_offset_c)
    }

    /// Forget the current measurement without touching the device.
    /// Used when the hub declares the data stale.
    pub fn mark_stale(&mut self) {
        self.state.leave_measuring();
        self.data_valid = false;
        self.co2.reset();
    }

    // ── Busy guard ────────────────────────────────────────────

    fn claim(&mut self) -> Result<(), DriverError> {
        if self.state.busy {
            return Err(DriverError::Busy);
        }
        self.state.busy = true;
        Ok(())
    }

    fn release(&mut self) {
        self.state.busy = false;
    }

    /// Run `op` with the sensor idle, restarting the measurement afterwards
    /// if it was running.
    fn with_idle<I, D, T>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        now_ms: u64,
        op: impl FnOnce(&mut Self, &mut SensorBus<I, D>) -> Result<T, DriverError>,
    ) -> Result<T, DriverError>
    where
        I: I2c,
        D: DelayNs,
    {
        self.claim()?;
        let was_measuring = self.state.measuring;
        let result = if was_measuring {
            self.force_idle_inner(bus).and_then(|()| op(self, bus))
        } else {
            op(self, bus)
        };
        self.release();

        if was_measuring && !self.state.measuring {
            if let Err(e) = SensorDriver::start(self, bus, now_ms) {
                warn!("SEN66: restart after command failed: {}", e);
                self.state.retry_at_ms = now_ms;
            }
        }
        result
    }

    // ── Measurement control ───────────────────────────────────

    fn stop_inner<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<(), DriverError> {
        bus.send_command(SEN66_ADDR, CMD_STOP, &[], STOP_DELAY_MS)?;
        self.state.leave_measuring();
        self.data_valid = false;
        Ok(())
    }

    fn force_idle_inner<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<(), DriverError> {
        let mut last = DriverError::Bus;
        for attempt in 1..=STOP_ATTEMPTS {
            match self.stop_inner(bus) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("SEN66: stop attempt {} failed: {}", attempt, e);
                    last = e;
                }
            }
        }
        warn!("SEN66: could not stop measurement ({})", last);
        Err(last)
    }

    pub fn stop<I: I2c, D: DelayNs>(&mut self, bus: &mut SensorBus<I, D>) -> Result<(), DriverError> {
        self.claim()?;
        let r = self.stop_inner(bus);
        self.release();
        if r.is_ok() {
            info!("SEN66: measurement stopped");
        }
        r
    }

    /// Stop with retries.  Succeeds immediately when already idle.
    pub fn force_idle<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<(), DriverError> {
        if !self.state.measuring {
            return Ok(());
        }
        self.claim()?;
        let r = self.force_idle_inner(bus);
        self.release();
        r
    }

    fn read_measurement<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<Option<[u16; 9]>, DriverError> {
        let mut ready = [0u16; 1];
        bus.read_words(SEN66_ADDR, CMD_DATA_READY, CMD_DELAY_MS, &mut ready)?;
        if ready[0] & 0x00FF == 0 {
            return Ok(None);
        }
        let mut words = [0u16; 9];
        bus.read_words(SEN66_ADDR, CMD_READ_VALUES, CMD_DELAY_MS, &mut words)?;
        Ok(Some(words))
    }

    fn apply(&mut self, words: &[u16; 9]) {
        let mut r = Sen66Reading::from_words(words);
        r.temperature_c = r
            .temperature_c
            .map(|t| t - self.hw_offset_c + self.user_offset_c);
        r.co2_ppm = r.co2_ppm.map(|c| self.co2.update(c));
        self.reading = r;
        self.data_valid = true;
    }

    // ── Calibration ───────────────────────────────────────────

    /// Push barometric pressure for CO2 compensation, at most once per
    /// [`AMBIENT_PRESSURE_INTERVAL_MS`].  Returns `true` when written.
    pub fn update_ambient_pressure<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        hpa: f32,
        now_ms: u64,
    ) -> bool {
        if !self.state.measuring || self.state.busy || !hpa.is_finite() {
            return false;
        }
        if self
            .last_ambient_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < AMBIENT_PRESSURE_INTERVAL_MS)
        {
            return false;
        }

        let raw = hpa
            .clamp(AMBIENT_PRESSURE_MIN_HPA, AMBIENT_PRESSURE_MAX_HPA)
            .round() as u16;
        self.state.busy = true;
        let r = bus.send_command(SEN66_ADDR, CMD_AMBIENT_PRESSURE, &[raw], CMD_DELAY_MS);
        self.release();

        match r {
            Ok(()) => {
                debug!("SEN66: ambient pressure set to {} hPa", raw);
                self.last_ambient_ms = Some(now_ms);
                self.ambient_failures.reset();
                true
            }
            Err(e) => {
                if self.ambient_failures.record() {
                    warn!(
                        "SEN66: ambient pressure update failed {} times ({}), deferring",
                        AMBIENT_FAIL_LIMIT, e
                    );
                    self.last_ambient_ms = Some(now_ms);
                }
                false
            }
        }
    }

    /// Apply a user temperature offset.  With `hardware` set, the offset is
    /// programmed into the device (so humidity is compensated too);
    /// otherwise the device offset is cleared and the correction is applied
    /// in software.
    pub fn set_temperature_offset<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        offset_c: f32,
        hardware: bool,
    ) -> Result<(), DriverError> {
        self.claim()?;
        self.user_offset_c = offset_c;
        let target = if hardware { offset_c } else { 0.0 };
        let raw = (target * TEMP_SCALE).round() as i16;
        // offset, slope, time constant, slot
        let r = bus.send_command(
            SEN66_ADDR,
            CMD_TEMP_OFFSET,
            &[raw as u16, 0, 0, 0],
            CMD_DELAY_MS,
        );
        self.release();
        r?;
        self.hw_offset_c = target;
        info!(
            "SEN66: temperature offset {:.2} C ({})",
            offset_c,
            if hardware { "device" } else { "software" }
        );
        Ok(())
    }

    /// Forced CO2 recalibration to `target_ppm`.  Returns the correction
    /// the device applied, in ppm.
    pub fn forced_recalibration<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        target_ppm: u16,
        now_ms: u64,
    ) -> Result<i16, DriverError> {
        self.with_idle(bus, now_ms, |s, bus| {
            bus.send_command(SEN66_ADDR, CMD_FORCED_RECAL, &[target_ppm], FRC_DELAY_MS)?;
            let mut word = [0u16; 1];
            bus.read_response(SEN66_ADDR, &mut word)?;
            if word[0] == FRC_FAILED {
                warn!("SEN66: FRC to {} ppm rejected by device", target_ppm);
                return Err(DriverError::DeviceRejected);
            }
            let correction = (i32::from(word[0]) - 0x8000) as i16;
            info!("SEN66: FRC to {} ppm, correction {} ppm", target_ppm, correction);
            s.co2.reset();
            Ok(correction)
        })
    }

    /// Enable or disable CO2 automatic self-calibration, verified by
    /// reading the setting back.
    pub fn set_asc<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        enabled: bool,
        now_ms: u64,
    ) -> Result<(), DriverError> {
        self.with_idle(bus, now_ms, |_, bus| {
            let want = u16::from(enabled);
            for attempt in 1..=ASC_VERIFY_ATTEMPTS {
                let got = bus
                    .send_command(SEN66_ADDR, CMD_CO2_ASC, &[want], CMD_DELAY_MS)
                    .and_then(|()| {
                        let mut w = [0u16; 1];
                        bus.read_words(SEN66_ADDR, CMD_CO2_ASC, CMD_DELAY_MS, &mut w)
                            .map(|()| w[0] & 0x00FF)
                    });
                match got {
                    Ok(v) if v == want => {
                        info!("SEN66: ASC {}", if enabled { "enabled" } else { "disabled" });
                        return Ok(());
                    }
                    Ok(v) => debug!("SEN66: ASC readback {} != {} (attempt {})", v, want, attempt),
                    Err(e) => debug!("SEN66: ASC attempt {} failed: {}", attempt, e),
                }
            }
            warn!("SEN66: ASC setting not confirmed");
            Err(DriverError::VerifyFailed)
        })
    }

    pub fn read_status<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<Sen66Status, DriverError> {
        self.claim()?;
        let mut w = [0u16; 2];
        let r = bus.read_words(SEN66_ADDR, CMD_DEVICE_STATUS, CMD_DELAY_MS, &mut w);
        self.release();
        r?;
        Ok(Sen66Status((u32::from(w[0]) << 16) | u32::from(w[1])))
    }

    /// Soft reset.  The device returns to idle with factory parameters, so
    /// the programmed offset and ambient pressure are forgotten.
    pub fn device_reset<I: I2c, D: DelayNs>(
        &mut self,
        bus: &mut SensorBus<I, D>,
    ) -> Result<(), DriverError> {
        self.claim()?;
        let r = bus.send_command(SEN66_ADDR, CMD_DEVICE_RESET, &[], RESET_DELAY_MS);
        self.release();
        r?;
        self.state.leave_measuring();
        self.data_valid = false;
        self.hw_offset_c = 0.0;
        self.last_ambient_ms = None;
        self.ambient_failures.reset();
        self.co2.reset();
        info!("SEN66: device reset");
        Ok(())
    }

    // ── VOC algorithm state ───────────────────────────────────

    /// Stage the persisted VOC state for the next `start()`.
    pub fn restore_calibration<F: FileSystem>(&mut self, store: &DurableStore<F>) -> bool {
        let mut buf = [0u8; VOC_STATE_LEN];
        match store.read(CAL_BLOB_PATH, &mut buf) {
            Ok(VOC_STATE_LEN) => {
                self.pending_voc_state = Some(buf);
                info!("SEN66: VOC state restored from flash");
                true
            }
            Ok(n) => {
                warn!("SEN66: ignoring VOC state of {} bytes", n);
                false
            }
            Err(StorageError::NotFound) => {
                info!("SEN66: no stored VOC state");
                false
            }
            Err(e) => {
                warn!("SEN66: VOC state read failed: {}", e);
                false
            }
        }
    }

    fn write_voc_state<I: I2c, D: DelayNs>(
        bus: &mut SensorBus<I, D>,
        blob: &[u8; VOC_STATE_LEN],
    ) -> Result<(), DriverError> {
        let mut words = [0u16; VOC_STATE_LEN / 2];
        for (w, pair) in words.iter_mut().zip(blob.chunks_exact(2)) {
            *w = u16::from_be_bytes([pair[0], pair[1]]);
        }
        bus.send_command(SEN66_ADDR, CMD_VOC_STATE, &words, CMD_DELAY_MS)
    }

    fn read_voc_state<I: I2c, D: DelayNs>(
        bus: &mut SensorBus<I, D>,
    ) -> Result<[u8; VOC_STATE_LEN], DriverError> {
        let mut words = [0u16; VOC_STATE_LEN / 2];
        bus.read_words(SEN66_ADDR, CMD_VOC_STATE, CMD_DELAY_MS, &mut words)?;
        let mut blob = [0u8; VOC_STATE_LEN];
        for (pair, w) in blob.chunks_exact_mut(2).zip(words) {
            pair.copy_from_slice(&w.to_be_bytes());
        }
        Ok(blob)
    }

    /// Read the VOC state back and persist it once per
    /// [`CAL_BLOB_SAVE_INTERVAL_MS`] of measurement.  Returns `true` when a
    /// blob was written.
    pub fn save_calibration_if_due<I: I2c, D: DelayNs, F: FileSystem>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        store: &mut DurableStore<F>,
        now_ms: u64,
    ) -> bool {
        if !self.state.measuring || self.state.busy {
            return false;
        }
        let Some(since) = self.last_voc_save_ms.or(self.state.warmup_start_ms) else {
            return false;
        };
        if now_ms.saturating_sub(since) < CAL_BLOB_SAVE_INTERVAL_MS {
            return false;
        }
        // Rate-limit retries as well as successes.
        self.last_voc_save_ms = Some(now_ms);

        match self.save_calibration(bus, store) {
            Ok(()) => true,
            Err(e) => {
                warn!("SEN66: VOC state save failed: {}", e);
                false
            }
        }
    }

    /// Read the VOC state from the device and persist it now.
    pub fn save_calibration<I: I2c, D: DelayNs, F: FileSystem>(
        &mut self,
        bus: &mut SensorBus<I, D>,
        store: &mut DurableStore<F>,
    ) -> Result<(), Error> {
        if !self.state.measuring {
            return Err(DriverError::NotMeasuring.into());
        }
        self.claim()?;
        let blob = Self::read_voc_state(bus);
        self.release();
        store.write_atomic(CAL_BLOB_PATH, &blob?)?;
        debug!("SEN66: VOC state saved");
        Ok(())
    }

    /// Drop the staged and persisted VOC state.
    pub fn clear_calibration<F: FileSystem>(
        &mut self,
        store: &mut DurableStore<F>,
    ) -> Result<(), StorageError> {
        self.pending_voc_state = None;
        self.last_voc_save_ms = None;
        store.remove(CAL_BLOB_PATH)?;
        info!("SEN66: stored VOC state cleared");
        Ok(())
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for Sen66 {
    fn begin(&mut self) {
        self.state = DriverState::default();
        self.failures.reset();
        self.ambient_failures.reset();
        self.reading = Sen66Reading::default();
        self.co2.reset();
        self.data_valid = false;
        self.last_ambient_ms = None;
        self.last_voc_save_ms = None;
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        self.claim()?;

        if let Some(blob) = self.pending_voc_state {
            if let Err(e) = Self::write_voc_state(bus, &blob) {
                self.release();
                return Err(e);
            }
            self.pending_voc_state = None;
            info!("SEN66: VOC state applied");
        }

        let r = bus.send_command(SEN66_ADDR, CMD_START, &[], START_DELAY_MS);
        self.release();
        r?;

        self.state.present = true;
        self.state.enter_measuring(now_ms);
        self.failures.reset();
        self.co2.reset();
        self.data_valid = false;
        info!("SEN66: measurement started");
        Ok(())
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        if !self.state.measuring
            || self.state.busy
            || !self.state.poll_due(now_ms, POLL_INTERVAL_MS)
        {
            return false;
        }
        self.state.last_poll_ms = Some(now_ms);

        match self.read_measurement(bus) {
            Ok(Some(words)) => {
                self.apply(&words);
                self.state.last_success_ms = Some(now_ms);
                self.failures.reset();
                true
            }
            Ok(None) => false,
            Err(e) => {
                if self.failures.record() {
                    warn!("SEN66: {} consecutive read failures ({})", POLL_FAIL_LIMIT, e);
                }
                false
            }
        }
    }

    fn is_valid(&self) -> bool {
        self.state.measuring && self.data_valid
    }
}
