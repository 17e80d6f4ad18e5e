//! CO2 moving-average filter with outlier snap.
//!
//! A short ring buffer smooths sensor jitter.  A reading that departs from
//! the current average by more than [`CO2_OUTLIER_PPM`] is treated as a real
//! step change (window opened, person entered) and the whole window is
//! refilled with it, so the output follows immediately instead of lagging.

const RING_BUF_CAP: usize = 5;

/// Deviation from the running average that re-seeds the window.
pub const CO2_OUTLIER_PPM: f32 = 200.0;

#[derive(Debug, Clone)]
pub struct Co2Smoother {
    ring: [f32; RING_BUF_CAP],
    head: usize,
    count: usize,
}

impl Default for Co2Smoother {
    fn default() -> Self {
        Self::new()
    }
}

impl Co2Smoother {
    pub const fn new() -> Self {
        Self {
            ring: [0.0; RING_BUF_CAP],
            head: 0,
            count: 0,
        }
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    /// Add a sample and return the smoothed value.
    pub fn update(&mut self, ppm: f32) -> f32 {
        if self.count == 0 || (ppm - self.average()).abs() > CO2_OUTLIER_PPM {
            self.ring = [ppm; RING_BUF_CAP];
            self.head = 0;
            self.count = RING_BUF_CAP;
            return ppm;
        }

        self.ring[self.head] = ppm;
        self.head = (self.head + 1) % RING_BUF_CAP;
        if self.count < RING_BUF_CAP {
            self.count += 1;
        }
        self.average()
    }

    fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        let sum: f32 = self.ring[..self.count].iter().sum();
        sum / self.count as f32
    }
}
