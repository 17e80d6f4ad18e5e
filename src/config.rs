//! System configuration parameters
//!
//! The user-tunable subset of the monitor's settings that the sensing core
//! consumes.  Persisted as a postcard blob by
//! [`ConfigStore`](crate::storage::config_store::ConfigStore); every value is
//! range-checked by [`validate_config`] before it reaches flash.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Sensors ---
    /// Whether the standalone CO module is fitted and should be polled
    pub co_sensor_enabled: bool,
    /// CO2 automatic self-calibration on the SEN66
    pub co2_asc_enabled: bool,

    // --- Temperature ---
    /// User temperature correction added to the SEN66 output (Celsius)
    pub temperature_offset_c: f32,
    /// Push the offset into the SEN66 so humidity is compensated too
    pub hardware_temperature_offset: bool,

    // --- Timing ---
    /// Hub tick interval (milliseconds)
    pub tick_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            co_sensor_enabled: true,
            co2_asc_enabled: true,

            temperature_offset_c: 0.0,
            hardware_temperature_offset: false,

            tick_interval_ms: 200, // 5 Hz
        }
    }
}

/// Range-check a configuration before it is persisted or applied.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !cfg.temperature_offset_c.is_finite() || !(-10.0..=10.0).contains(&cfg.temperature_offset_c)
    {
        return Err(ConfigError::ValidationFailed(
            "temperature_offset_c must be -10.0–10.0",
        ));
    }
    if !(50..=5000).contains(&cfg.tick_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "tick_interval_ms must be 50–5000",
        ));
    }
    Ok(())
}
