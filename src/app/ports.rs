//! Port traits: the hexagonal boundary between the sensing core and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SensorHub / DurableStore / PressureHistory
//! ```
//!
//! Driven adapters (flash filesystem, clock, snapshot consumers, config
//! storage) implement these traits.  The core consumes them via generics,
//! so nothing outside `adapters` touches ESP-IDF directly.  The I2C bus and
//! delays use the `embedded-hal` traits instead of a local port.
//!
//! ## Durability notes
//!
//! - **FileSystem** implementations are NOT required to be atomic; the
//!   [`DurableStore`](crate::storage::durable::DurableStore) layers atomic
//!   replace on top of plain write/rename/remove.
//! - **ConfigPort** implementations MUST validate before persisting.

use crate::config::SystemConfig;
use crate::hub::snapshot::SensorSnapshot;

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: system timer / RTC → core)
// ───────────────────────────────────────────────────────────────

/// Monotonic and wall-clock time source.
pub trait Clock {
    /// Milliseconds since boot.  Never goes backwards.
    fn now_ms(&self) -> u64;

    /// Seconds since the Unix epoch, or `None` while the wall clock is
    /// unset (no RTC, no network time yet).
    fn epoch_secs(&self) -> Option<u32>;
}

// ───────────────────────────────────────────────────────────────
// Filesystem port (driven adapter: core ↔ flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Minimal flat filesystem used for every persisted blob.
///
/// Paths are short relative names (`config.bin`, `pressure.bin`); the
/// adapter decides where they live.
pub trait FileSystem {
    /// Read a file into `buf`.  Returns the number of bytes copied.
    /// A file larger than `buf` is an error, never a silent truncation.
    fn read(&self, path: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Create or truncate `path` and write `data` to it.
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError>;

    /// Delete a file.  Returns `Ok(())` even if the file didn't exist.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Check whether a file exists without reading it.
    fn exists(&self, path: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: core ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&mut self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Snapshot sink (driven adapter: core → UI / network publisher)
// ───────────────────────────────────────────────────────────────

/// Receives the fused snapshot whenever a tick reports a change.
/// Adapters decide where it goes (serial log, display, MQTT).
pub trait SnapshotSink {
    fn publish(&mut self, snapshot: &SensorSnapshot);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`FileSystem`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Filesystem is full.
    Full,
    /// Generic I/O error.
    IoError,
    /// The file is larger than the caller's buffer.
    TooLarge,
    /// The path (or a derived temp/backup path) is not representable.
    InvalidPath,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
            Self::TooLarge => write!(f, "file larger than buffer"),
            Self::InvalidPath => write!(f, "invalid path"),
        }
    }
}

impl From<StorageError> for ConfigError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => Self::NotFound,
            StorageError::Full => Self::StorageFull,
            _ => Self::IoError,
        }
    }
}
