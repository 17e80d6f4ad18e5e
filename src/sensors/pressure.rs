//! The active barometric pressure source.
//!
//! Boards carry either a DPS310 or a BMP280.  Exactly one is driven at a
//! time; the DPS310 is preferred and the BMP280 is tried only when the
//! DPS310 cannot be initialised.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use super::bmp280::Bmp280;
use super::bus::SensorBus;
use super::dps310::Dps310;
use super::{DriverState, SensorDriver};
use crate::error::DriverError;

/// Plausible barometric range; anything outside is a sensor fault.
pub const PRESSURE_MIN_HPA: f32 = 300.0;
pub const PRESSURE_MAX_HPA: f32 = 1100.0;
pub const STALE_MS: u64 = 30_000;

pub fn is_plausible(hpa: f32) -> bool {
    hpa.is_finite() && (PRESSURE_MIN_HPA..=PRESSURE_MAX_HPA).contains(&hpa)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressureSource {
    Dps310,
    Bmp280,
}

pub enum PressureUnit {
    Dps310(Dps310),
    Bmp280(Bmp280),
}

impl PressureUnit {
    /// Bring up the first pressure sensor that answers.
    pub fn detect<I: I2c, D: DelayNs>(bus: &mut SensorBus<I, D>, now_ms: u64) -> Option<Self> {
        let mut dps = Dps310::new();
        match SensorDriver::<I, D>::start(&mut dps, bus, now_ms) {
            Ok(()) => return Some(Self::Dps310(dps)),
            Err(e) => info!("Pressure: DPS310 unavailable ({})", e),
        }
        let mut bmp = Bmp280::new();
        match SensorDriver::<I, D>::start(&mut bmp, bus, now_ms) {
            Ok(()) => Some(Self::Bmp280(bmp)),
            Err(e) => {
                warn!("Pressure: no sensor found (BMP280: {})", e);
                None
            }
        }
    }

    pub fn source(&self) -> PressureSource {
        match self {
            Self::Dps310(_) => PressureSource::Dps310,
            Self::Bmp280(_) => PressureSource::Bmp280,
        }
    }

    pub fn pressure_hpa(&self) -> Option<f32> {
        match self {
            Self::Dps310(d) => d.pressure_hpa(),
            Self::Bmp280(d) => d.pressure_hpa(),
        }
    }

    pub fn state(&self) -> &DriverState {
        match self {
            Self::Dps310(d) => d.state(),
            Self::Bmp280(d) => d.state(),
        }
    }

    pub fn invalidate(&mut self) {
        match self {
            Self::Dps310(d) => d.invalidate(),
            Self::Bmp280(d) => d.invalidate(),
        }
    }
}

impl<I: I2c, D: DelayNs> SensorDriver<I, D> for PressureUnit {
    fn begin(&mut self) {
        match self {
            Self::Dps310(d) => SensorDriver::<I, D>::begin(d),
            Self::Bmp280(d) => SensorDriver::<I, D>::begin(d),
        }
    }

    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError> {
        match self {
            Self::Dps310(d) => d.start(bus, now_ms),
            Self::Bmp280(d) => d.start(bus, now_ms),
        }
    }

    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool {
        match self {
            Self::Dps310(d) => d.poll(bus, now_ms),
            Self::Bmp280(d) => d.poll(bus, now_ms),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Self::Dps310(d) => SensorDriver::<I, D>::is_valid(d),
            Self::Bmp280(d) => SensorDriver::<I, D>::is_valid(d),
        }
    }
}
