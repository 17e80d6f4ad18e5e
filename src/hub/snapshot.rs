//! The fused sensor snapshot.
//!
//! Each quantity is an `Option<f32>`: `None` means "no valid value", so a
//! number can never be read without its validity.  Two snapshots compare
//! equal exactly when every field's validity and value match, which is
//! what the hub's change detection relies on.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub temperature_c: Option<f32>,
    pub humidity_pct: Option<f32>,
    pub pm1_0: Option<f32>,
    pub pm2_5: Option<f32>,
    pub pm4_0: Option<f32>,
    pub pm10_0: Option<f32>,
    pub co2_ppm: Option<f32>,
    pub voc_index: Option<f32>,
    pub nox_index: Option<f32>,
    pub hcho_ppb: Option<f32>,
    pub co_ppm: Option<f32>,
    pub pressure_hpa: Option<f32>,
    pub pressure_delta_3h_hpa: Option<f32>,
    pub pressure_delta_24h_hpa: Option<f32>,
}

impl SensorSnapshot {
    pub const fn empty() -> Self {
        Self {
            temperature_c: None,
            humidity_pct: None,
            pm1_0: None,
            pm2_5: None,
            pm4_0: None,
            pm10_0: None,
            co2_ppm: None,
            voc_index: None,
            nox_index: None,
            hcho_ppb: None,
            co_ppm: None,
            pressure_hpa: None,
            pressure_delta_3h_hpa: None,
            pressure_delta_24h_hpa: None,
        }
    }

    pub fn any_pm_valid(&self) -> bool {
        self.pm1_0.is_some() || self.pm2_5.is_some() || self.pm4_0.is_some() || self.pm10_0.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    pub fn clear_pressure(&mut self) {
        self.pressure_hpa = None;
        self.pressure_delta_3h_hpa = None;
        self.pressure_delta_24h_hpa = None;
    }
}
