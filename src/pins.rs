//! GPIO / peripheral pin assignments for the AirSense main board.
//!
//! Single source of truth; the board bring-up in `main.rs` references this
//! module rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Sensor I2C bus (SEN66, SFA30, CO module, DPS310 / BMP280)
// ---------------------------------------------------------------------------

/// I2C0 data line.
pub const I2C_SDA_GPIO: i32 = 8;
/// I2C0 clock line.
pub const I2C_SCL_GPIO: i32 = 9;
/// The SEN66 and SFA30 top out at 100 kHz.
pub const I2C_FREQ_HZ: u32 = 100_000;
