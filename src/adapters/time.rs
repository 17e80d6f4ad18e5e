//! ESP32 clock adapter.
//!
//! Implements [`Clock`] for the sensing core.
//!
//! - **`target_os = "espidf"`**: monotonic time from `esp_timer_get_time()`,
//!   wall clock from `gettimeofday()`.
//! - **`not(target_os = "espidf")`**: `std::time::Instant` and
//!   `SystemTime` for host-side simulation.

use crate::app::ports::Clock;

/// Wall-clock readings before 2020-01-01 mean the clock was never set.
pub const EPOCH_2020: u32 = 1_577_836_800;

/// Treat an unset (pre-2020) wall clock as unknown.
pub fn plausible_epoch(secs: i64) -> Option<u32> {
    u32::try_from(secs).ok().filter(|&s| s >= EPOCH_2020)
}

/// Time adapter for the ESP32-S3 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Clock for Esp32TimeAdapter {
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1000
    }

    fn epoch_secs(&self) -> Option<u32> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        plausible_epoch(tv.tv_sec as i64)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for Esp32TimeAdapter {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn epoch_secs(&self) -> Option<u32> {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        plausible_epoch(i64::try_from(secs).ok()?)
    }
}
