//! Unified error types for the AirSense firmware core.
//!
//! Drivers report [`DriverError`]; storage and configuration failures use the
//! port errors from [`crate::app::ports`].  Every subsystem converts into the
//! top-level [`Error`] so the boot path can handle them uniformly.  All
//! variants are `Copy` so they can be passed around without allocation.

use core::fmt;

use crate::app::ports::{ConfigError, StorageError};

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor transaction or command failed.
    Driver(DriverError),
    /// The flash filesystem rejected an operation.
    Storage(StorageError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(e) => write!(f, "driver: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Driver errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The I2C transaction itself failed (NACK, arbitration, timeout).
    Bus,
    /// A response word or frame failed its checksum.
    Crc,
    /// The device did not acknowledge its address.
    NotPresent,
    /// Another command is still running on this device.
    Busy,
    /// The operation needs an active measurement.
    NotMeasuring,
    /// The device answered but refused the request (e.g. FRC sentinel).
    DeviceRejected,
    /// A setting did not read back as written.
    VerifyFailed,
    /// The response had the wrong shape (length, echo byte, identity).
    InvalidResponse,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "I2C bus error"),
            Self::Crc => write!(f, "checksum mismatch"),
            Self::NotPresent => write!(f, "device not present"),
            Self::Busy => write!(f, "device busy"),
            Self::NotMeasuring => write!(f, "measurement not running"),
            Self::DeviceRejected => write!(f, "device rejected command"),
            Self::VerifyFailed => write!(f, "readback verification failed"),
            Self::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
