//! Per-tick sanity filtering of the fused snapshot.
//!
//! Temperature and humidity have hard limits (outside: invalid) and
//! recommended limits (outside: one warning until back in range).  Gas and
//! particulate values are clamped to the sensor's rated span when finite
//! and invalidated otherwise.

use core::ops::RangeInclusive;

use log::{info, warn};

use super::snapshot::SensorSnapshot;

pub const TEMP_HARD_C: RangeInclusive<f32> = -10.0..=60.0;
pub const TEMP_RECOMMENDED_C: RangeInclusive<f32> = 10.0..=40.0;
pub const RH_HARD_PCT: RangeInclusive<f32> = 0.0..=100.0;
pub const RH_RECOMMENDED_PCT: RangeInclusive<f32> = 20.0..=80.0;
pub const CO2_RANGE_PPM: RangeInclusive<f32> = 0.0..=40_000.0;
pub const GAS_INDEX_RANGE: RangeInclusive<f32> = 1.0..=500.0;
pub const PM_RANGE_UG: RangeInclusive<f32> = 0.0..=1000.0;
pub const HCHO_RANGE_PPB: RangeInclusive<f32> = 0.0..=1000.0;
pub const CO_RANGE_PPM: RangeInclusive<f32> = 0.0..=1000.0;

/// Keep `v` only if finite and inside `range`.
fn within(v: Option<f32>, range: &RangeInclusive<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite() && range.contains(x))
}

/// Clamp a finite `v` into `range`; drop non-finite values.
fn clamped(v: Option<f32>, range: &RangeInclusive<f32>) -> Option<f32> {
    v.filter(|x| x.is_finite())
        .map(|x| x.clamp(*range.start(), *range.end()))
}

/// One-shot "outside recommended range" latch.
#[derive(Debug, Default)]
struct Advisory {
    active: bool,
}

impl Advisory {
    fn update(&mut self, name: &str, v: Option<f32>, range: &RangeInclusive<f32>) {
        let Some(v) = v else { return };
        let outside = !range.contains(&v);
        if outside && !self.active {
            warn!(
                "Filter: {} {:.1} outside recommended {:.0}..{:.0}",
                name,
                v,
                range.start(),
                range.end()
            );
        } else if !outside && self.active {
            info!("Filter: {} back in recommended range", name);
        }
        self.active = outside;
    }
}

#[derive(Debug, Default)]
pub struct SanityFilter {
    temperature: Advisory,
    humidity: Advisory,
}

impl SanityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, s: &mut SensorSnapshot) {
        s.temperature_c = within(s.temperature_c, &TEMP_HARD_C);
        s.humidity_pct = within(s.humidity_pct, &RH_HARD_PCT);
        self.temperature
            .update("temperature", s.temperature_c, &TEMP_RECOMMENDED_C);
        self.humidity
            .update("humidity", s.humidity_pct, &RH_RECOMMENDED_PCT);

        s.co2_ppm = clamped(s.co2_ppm, &CO2_RANGE_PPM);
        s.voc_index = clamped(s.voc_index, &GAS_INDEX_RANGE);
        s.nox_index = clamped(s.nox_index, &GAS_INDEX_RANGE);
        s.pm1_0 = clamped(s.pm1_0, &PM_RANGE_UG);
        s.pm2_5 = clamped(s.pm2_5, &PM_RANGE_UG);
        s.pm4_0 = clamped(s.pm4_0, &PM_RANGE_UG);
        s.pm10_0 = clamped(s.pm10_0, &PM_RANGE_UG);
        s.hcho_ppb = clamped(s.hcho_ppb, &HCHO_RANGE_PPB);
        s.co_ppm = clamped(s.co_ppm, &CO_RANGE_PPM);
    }
}
