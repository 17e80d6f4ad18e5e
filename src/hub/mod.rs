//! Sensor hub: owns the bus, every driver and the fused snapshot.
//!
//! ```text
//!   tick()
//!     ├─ SEN66   poll → T/RH/PM/CO2 (+VOC/NOx after warm-up); (re)start
//!     ├─ pressure poll → snapshot, history, SEN66 ambient compensation
//!     ├─ SFA30 / CO poll
//!     ├─ staleness checks
//!     ├─ sanity filter
//!     └─ persistence (VOC state, pressure history)
//! ```
//!
//! Nothing in here is fatal: any sensor may be missing or fail at any time
//! and the corresponding snapshot fields simply become `None`.

pub mod filter;
pub mod snapshot;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::app::ports::{Clock, FileSystem};
use crate::config::SystemConfig;
use crate::error::{DriverError, Error};
use crate::history::{HistoryLoad, PressureHistory};
use crate::sensors::bus::SensorBus;
use crate::sensors::co::CoSensor;
use crate::sensors::pressure::{self, PressureSource, PressureUnit};
use crate::sensors::sen66::{SEN66_ADDR, Sen66};
use crate::sensors::sfa30::{self, Sfa30};
use crate::sensors::{SensorDriver, co};
use crate::storage::durable::DurableStore;
use filter::SanityFilter;
use snapshot::SensorSnapshot;

/// Delay before the first SEN66 start, letting its supply settle.
pub const START_GRACE_MS: u64 = 3000;
/// Wait between attempts to (re)start a sensor that failed.
pub const RETRY_BACKOFF_MS: u64 = 30_000;
pub const SEN66_STALE_MS: u64 = 30_000;

pub struct SensorHub<I, D, F> {
    bus: SensorBus<I, D>,
    store: DurableStore<F>,
    config: SystemConfig,
    sen66: Sen66,
    sfa30: Sfa30,
    co: CoSensor,
    pressure: Option<PressureUnit>,
    history: PressureHistory,
    filter: SanityFilter,
    snapshot: SensorSnapshot,
    previous: SensorSnapshot,
    sen66_configured: bool,
    sfa30_retry_at_ms: u64,
    co_retry_at_ms: u64,
    pressure_retry_at_ms: u64,
}

impl<I: I2c, D: DelayNs, F: FileSystem> SensorHub<I, D, F> {
    pub fn new(bus: SensorBus<I, D>, store: DurableStore<F>, config: SystemConfig) -> Self {
        Self {
            bus,
            store,
            config,
            sen66: Sen66::new(),
            sfa30: Sfa30::new(),
            co: CoSensor::new(),
            pressure: None,
            history: PressureHistory::new(),
            filter: SanityFilter::new(),
            snapshot: SensorSnapshot::empty(),
            previous: SensorSnapshot::empty(),
            sen66_configured: false,
            sfa30_retry_at_ms: 0,
            co_retry_at_ms: 0,
            pressure_retry_at_ms: 0,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn snapshot(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn history(&self) -> &PressureHistory {
        &self.history
    }

    pub fn sen66(&self) -> &Sen66 {
        &self.sen66
    }

    pub fn pressure_source(&self) -> Option<PressureSource> {
        self.pressure.as_ref().map(PressureUnit::source)
    }

    pub fn store(&self) -> &DurableStore<F> {
        &self.store
    }

    // ── Startup ───────────────────────────────────────────────

    pub fn begin<C: Clock>(&mut self, clock: &C) {
        let now = clock.now_ms();

        SensorDriver::<I, D>::begin(&mut self.sen66);
        self.sen66.restore_calibration(&self.store);
        self.sen66.schedule_retry(now + START_GRACE_MS);
        self.sen66_configured = false;

        self.pressure = PressureUnit::detect(&mut self.bus, now);
        if self.pressure.is_none() {
            self.pressure_retry_at_ms = now + RETRY_BACKOFF_MS;
        }

        SensorDriver::<I, D>::begin(&mut self.sfa30);
        if let Err(e) = self.sfa30.start(&mut self.bus, now) {
            info!("Hub: SFA30 not started ({})", e);
            self.sfa30_retry_at_ms = now + RETRY_BACKOFF_MS;
        }

        SensorDriver::<I, D>::begin(&mut self.co);
        if self.config.co_sensor_enabled {
            if let Err(e) = self.co.start(&mut self.bus, now) {
                info!("Hub: CO sensor not started ({})", e);
                self.co_retry_at_ms = now + RETRY_BACKOFF_MS;
            }
        }

        match self.history.load(&mut self.store, clock.epoch_secs()) {
            HistoryLoad::Restored { .. } | HistoryLoad::GapPending { .. } => {
                self.snapshot.pressure_delta_3h_hpa = self.history.delta_3h();
                self.snapshot.pressure_delta_24h_hpa = self.history.delta_24h();
            }
            HistoryLoad::Empty | HistoryLoad::Discarded => {}
        }

        info!(
            "Hub: started (pressure: {:?}, CO: {})",
            self.pressure_source(),
            if self.config.co_sensor_enabled { "enabled" } else { "disabled" }
        );
    }

    // ── Per-tick pipeline ─────────────────────────────────────

    /// Advance every driver once.  Returns `true` when the snapshot differs
    /// from the previous tick.
    pub fn tick<C: Clock>(&mut self, clock: &C) -> bool {
        let now = clock.now_ms();
        let epoch = clock.epoch_secs();

        self.poll_sen66(now);
        if !self.sen66.is_measuring() && !self.sen66.is_busy() && self.sen66.retry_due(now) {
            self.start_sen66(now);
        }
        self.poll_pressure(now, epoch);
        self.poll_sfa30(now);
        self.poll_co(now);
        self.check_staleness(now);
        self.filter.apply(&mut self.snapshot);
        self.persist(now);

        let changed = self.snapshot != self.previous;
        self.previous = self.snapshot;
        changed
    }

    fn poll_sen66(&mut self, now: u64) {
        if !self.sen66.poll(&mut self.bus, now) {
            return;
        }
        let r = *self.sen66.reading();
        let s = &mut self.snapshot;
        s.temperature_c = r.temperature_c;
        s.humidity_pct = r.humidity_pct;
        s.pm1_0 = r.pm1_0;
        s.pm2_5 = r.pm2_5;
        s.pm4_0 = r.pm4_0;
        s.pm10_0 = r.pm10_0;
        s.co2_ppm = r.co2_ppm;
        if self.sen66.gas_ready(now) {
            s.voc_index = r.voc_index;
            s.nox_index = r.nox_index;
        } else {
            s.voc_index = None;
            s.nox_index = None;
        }
    }

    /// Push the configured offset and ASC mode into the SEN66.
    fn configure_sen66(&mut self, now: u64) -> Result<(), DriverError> {
        self.sen66.set_temperature_offset(
            &mut self.bus,
            self.config.temperature_offset_c,
            self.config.hardware_temperature_offset,
        )?;
        self.sen66
            .set_asc(&mut self.bus, self.config.co2_asc_enabled, now)?;
        Ok(())
    }

    fn start_sen66(&mut self, now: u64) {
        let result = if !self.bus.probe(SEN66_ADDR) {
            Err(DriverError::NotPresent)
        } else if self.sen66_configured {
            self.sen66.start(&mut self.bus, now)
        } else {
            self.configure_sen66(now).and_then(|()| {
                self.sen66_configured = true;
                self.sen66.start(&mut self.bus, now)
            })
        };

        if let Err(e) = result {
            warn!("Hub: SEN66 start failed ({}), retrying in {} s", e, RETRY_BACKOFF_MS / 1000);
            self.sen66.schedule_retry(now + RETRY_BACKOFF_MS);
        }
    }

    fn poll_pressure(&mut self, now: u64, epoch: Option<u32>) {
        if self.pressure.is_none() {
            if now >= self.pressure_retry_at_ms {
                self.pressure = PressureUnit::detect(&mut self.bus, now);
                self.pressure_retry_at_ms = now + RETRY_BACKOFF_MS;
            }
            return;
        }
        let Some(unit) = self.pressure.as_mut() else { return };

        if !unit.poll(&mut self.bus, now) {
            return;
        }
        match unit.pressure_hpa() {
            Some(hpa) if pressure::is_plausible(hpa) => {
                self.snapshot.pressure_hpa = Some(hpa);
                self.history.record(hpa, now, epoch);
                self.snapshot.pressure_delta_3h_hpa = self.history.delta_3h();
                self.snapshot.pressure_delta_24h_hpa = self.history.delta_24h();
                self.sen66.update_ambient_pressure(&mut self.bus, hpa, now);
            }
            other => {
                debug!("Hub: implausible pressure {:?} rejected", other);
                unit.invalidate();
                self.snapshot.pressure_hpa = None;
            }
        }
    }

    fn poll_sfa30(&mut self, now: u64) {
        if !self.sfa30.state().measuring {
            if now >= self.sfa30_retry_at_ms {
                if let Err(e) = self.sfa30.start(&mut self.bus, now) {
                    debug!("Hub: SFA30 start failed ({})", e);
                    self.sfa30_retry_at_ms = now + RETRY_BACKOFF_MS;
                }
            }
        } else {
            self.sfa30.poll(&mut self.bus, now);
        }

        self.snapshot.hcho_ppb =
            if SensorDriver::<I, D>::is_valid(&self.sfa30) && self.sfa30.hcho_ready(now) {
                self.sfa30.reading().hcho_ppb
            } else {
                None
            };
    }

    fn poll_co(&mut self, now: u64) {
        if !self.config.co_sensor_enabled {
            self.snapshot.co_ppm = None;
            return;
        }
        if !self.co.state().measuring {
            if now >= self.co_retry_at_ms {
                if let Err(e) = self.co.start(&mut self.bus, now) {
                    debug!("Hub: CO start failed ({})", e);
                    self.co_retry_at_ms = now + RETRY_BACKOFF_MS;
                }
            }
        } else {
            self.co.poll(&mut self.bus, now);
        }

        self.snapshot.co_ppm = if self.co.state().present
            && self.co.warmed_up(now)
            && SensorDriver::<I, D>::is_valid(&self.co)
        {
            self.co.ppm()
        } else {
            None
        };
    }

    fn check_staleness(&mut self, now: u64) {
        if self.sen66.state().is_stale(now, SEN66_STALE_MS) {
            warn!("Hub: SEN66 data stale, restarting");
            match self.sen66.read_status(&mut self.bus) {
                Ok(status) if status.has_error() || status.fan_speed_warning() => {
                    warn!("Hub: SEN66 status 0x{:08X}", status.0);
                }
                Ok(_) => {}
                Err(e) => debug!("Hub: SEN66 status read failed ({})", e),
            }
            if let Err(e) = self.sen66.force_idle(&mut self.bus) {
                debug!("Hub: SEN66 stop before restart failed ({})", e);
            }
            self.sen66.mark_stale();
            self.sen66.schedule_retry(now);
            self.snapshot.reset();
        }

        if let Some(unit) = self.pressure.as_mut() {
            if unit.state().is_stale(now, pressure::STALE_MS) {
                if self.snapshot.pressure_hpa.is_some() {
                    warn!("Hub: pressure data stale");
                }
                unit.invalidate();
                self.snapshot.clear_pressure();
            }
        }

        if self.sfa30.state().is_stale(now, sfa30::STALE_MS) {
            warn!("Hub: SFA30 data stale, resetting");
            if let Err(e) = self.sfa30.device_reset(&mut self.bus) {
                debug!("Hub: SFA30 reset failed ({})", e);
            }
            self.sfa30_retry_at_ms = now;
            self.snapshot.hcho_ppb = None;
        }

        if self.co.state().is_stale(now, co::STALE_MS) {
            self.co.invalidate();
            self.snapshot.co_ppm = None;
        }
    }

    fn persist(&mut self, now: u64) {
        self.sen66
            .save_calibration_if_due(&mut self.bus, &mut self.store, now);
        self.history.save_if_due(&mut self.store, now);
    }

    // ── Commands ──────────────────────────────────────────────

    /// Forced CO2 recalibration against a reference concentration.
    pub fn forced_recalibration(&mut self, target_ppm: u16, now: u64) -> Result<i16, DriverError> {
        self.sen66.forced_recalibration(&mut self.bus, target_ppm, now)
    }

    pub fn set_co2_asc(&mut self, enabled: bool, now: u64) -> Result<(), DriverError> {
        self.sen66.set_asc(&mut self.bus, enabled, now)?;
        self.config.co2_asc_enabled = enabled;
        Ok(())
    }

    pub fn set_temperature_offset(&mut self, offset_c: f32, hardware: bool) -> Result<(), DriverError> {
        self.config.temperature_offset_c = offset_c;
        self.config.hardware_temperature_offset = hardware;
        self.sen66
            .set_temperature_offset(&mut self.bus, offset_c, hardware)
    }

    /// Apply a new configuration at runtime.
    pub fn apply_config(&mut self, config: SystemConfig, now: u64) {
        let old = core::mem::replace(&mut self.config, config);

        if old.temperature_offset_c != self.config.temperature_offset_c
            || old.hardware_temperature_offset != self.config.hardware_temperature_offset
            || old.co2_asc_enabled != self.config.co2_asc_enabled
        {
            if self.sen66.state().present {
                if let Err(e) = self.configure_sen66(now) {
                    warn!("Hub: SEN66 reconfiguration failed ({})", e);
                    self.sen66_configured = false;
                }
            } else {
                self.sen66_configured = false;
            }
        }

        if old.co_sensor_enabled && !self.config.co_sensor_enabled {
            SensorDriver::<I, D>::begin(&mut self.co);
            self.snapshot.co_ppm = None;
            info!("Hub: CO sensor disabled");
        } else if !old.co_sensor_enabled && self.config.co_sensor_enabled {
            self.co_retry_at_ms = now;
            info!("Hub: CO sensor enabled");
        }
    }

    /// Forget the learned VOC baseline: delete the stored blob and reset
    /// the device so its in-RAM algorithm state is dropped too.
    pub fn reset_calibration(&mut self, now: u64) -> Result<(), Error> {
        self.sen66.clear_calibration(&mut self.store)?;
        if self.sen66.state().present {
            self.sen66.device_reset(&mut self.bus)?;
            self.sen66_configured = false;
            self.sen66.schedule_retry(now);
        }
        Ok(())
    }

    /// Flush persisted state immediately (e.g. before an orderly reboot).
    pub fn persist_now(&mut self, now: u64) -> Result<(), Error> {
        if self.sen66.is_measuring() {
            self.sen66.save_calibration(&mut self.bus, &mut self.store)?;
        }
        if !self.history.is_empty() && self.history.is_dirty() {
            self.history.save(&mut self.store, now)?;
        }
        Ok(())
    }
}
