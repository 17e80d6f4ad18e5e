//! Persistence: crash-safe blob storage on the flash filesystem.
//!
//! | Blob             | Writer                   | Format                |
//! |------------------|--------------------------|-----------------------|
//! | `config.bin`     | [`config_store`]         | postcard `SystemConfig` |
//! | `config.lkg`     | [`lkg`] promotion        | copy of `config.bin`  |
//! | `sen66_voc.bin`  | SEN66 driver             | 8 raw bytes           |
//! | `pressure.bin`   | pressure history         | fixed 1166-byte record |
//!
//! Every write goes through [`durable::DurableStore::write_atomic`].

pub mod config_store;
pub mod durable;
pub mod lkg;

pub const CONFIG_PATH: &str = "config.bin";
pub const LKG_PATH: &str = "config.lkg";
pub const CAL_BLOB_PATH: &str = "sen66_voc.bin";
pub const HISTORY_PATH: &str = "pressure.bin";
/// One-byte decision file left by the boot supervisor.
pub const BOOT_ACTION_PATH: &str = "boot_action";

/// Everything a factory reset wipes.
pub const PERSISTED_PATHS: [&str; 4] = [CONFIG_PATH, LKG_PATH, CAL_BLOB_PATH, HISTORY_PATH];

/// Startup decision handed over by the boot-safety supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootAction {
    #[default]
    Normal,
    RestoreLastKnownGood,
    FactoryReset,
}

impl BootAction {
    /// Decode the supervisor's byte.  Unknown values mean `Normal`.
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Self::RestoreLastKnownGood,
            2 => Self::FactoryReset,
            _ => Self::Normal,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::RestoreLastKnownGood => 1,
            Self::FactoryReset => 2,
        }
    }
}
