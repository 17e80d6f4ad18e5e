//! Sensor subsystem: I2C protocol drivers and their shared contract.
//!
//! Every driver implements [`SensorDriver`] and keeps its own
//! [`DriverState`].  The [`SensorHub`](crate::hub::SensorHub) owns the
//! drivers and the single [`SensorBus`](bus::SensorBus) they share.

pub mod bmp280;
pub mod bus;
pub mod co;
pub mod dps310;
pub mod pressure;
pub mod sen66;
pub mod sensirion;
pub mod sfa30;
pub mod smoothing;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::error::DriverError;
use bus::SensorBus;

/// Lifecycle shared by every protocol driver.
///
/// `poll` never blocks beyond the command settle times of a single
/// transaction and is rate-limited internally; calling it every tick is
/// cheap.
pub trait SensorDriver<I: I2c, D: DelayNs> {
    /// Reset in-memory session state.  No bus traffic.
    fn begin(&mut self);

    /// Begin continuous sampling.
    fn start(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> Result<(), DriverError>;

    /// Advance the driver.  Returns `true` when new data arrived.
    fn poll(&mut self, bus: &mut SensorBus<I, D>, now_ms: u64) -> bool;

    /// Whether the driver currently holds a usable reading.
    fn is_valid(&self) -> bool;
}

/// Per-driver session bookkeeping.  All timestamps are monotonic ms.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverState {
    pub present: bool,
    pub busy: bool,
    pub measuring: bool,
    pub warmup_start_ms: Option<u64>,
    pub last_poll_ms: Option<u64>,
    pub last_success_ms: Option<u64>,
    pub retry_at_ms: u64,
}

impl DriverState {
    /// True when at least `interval_ms` has passed since the last poll.
    pub fn poll_due(&self, now_ms: u64, interval_ms: u64) -> bool {
        self.last_poll_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= interval_ms)
    }

    pub fn warmed_up(&self, now_ms: u64, warmup_ms: u64) -> bool {
        self.warmup_start_ms
            .is_some_and(|t| now_ms.saturating_sub(t) >= warmup_ms)
    }

    /// Age of the newest data, counted from measurement start when no
    /// sample has arrived yet.  `None` while not measuring.
    pub fn data_age_ms(&self, now_ms: u64) -> Option<u64> {
        if !self.measuring {
            return None;
        }
        self.last_success_ms
            .or(self.warmup_start_ms)
            .map(|t| now_ms.saturating_sub(t))
    }

    pub fn is_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        self.data_age_ms(now_ms).is_some_and(|age| age >= threshold_ms)
    }

    /// Mark a measurement as running from `now_ms`.
    pub fn enter_measuring(&mut self, now_ms: u64) {
        self.measuring = true;
        self.warmup_start_ms = Some(now_ms);
        self.last_success_ms = None;
        self.last_poll_ms = None;
    }

    pub fn leave_measuring(&mut self) {
        self.measuring = false;
        self.warmup_start_ms = None;
    }
}

/// Consecutive-failure counter that escalates once per `threshold`
/// failures and then starts over.
#[derive(Debug, Clone, Copy)]
pub struct FailureCounter {
    count: u8,
    threshold: u8,
}

impl FailureCounter {
    pub const fn new(threshold: u8) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Count one failure.  Returns `true` when the threshold is reached;
    /// the counter resets at that point.
    pub fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u8 {
        self.count
    }
}
