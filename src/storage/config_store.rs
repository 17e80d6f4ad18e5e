//! Flash-backed [`ConfigPort`] with last-known-good tracking.

use log::{debug, info, warn};

use super::durable::DurableStore;
use super::lkg::{self, BootOutcome, LastKnownGood};
use super::{BOOT_ACTION_PATH, BootAction, CONFIG_PATH};
use crate::app::ports::{ConfigError, ConfigPort, FileSystem, StorageError};
use crate::config::{SystemConfig, validate_config};

/// Upper bound on the serialized config size.
const CONFIG_MAX_LEN: usize = 128;

pub struct ConfigStore<F> {
    store: DurableStore<F>,
    lkg: LastKnownGood,
}

impl<F: FileSystem> ConfigStore<F> {
    pub fn new(store: DurableStore<F>) -> Self {
        Self {
            store,
            lkg: LastKnownGood::new(),
        }
    }

    pub fn store(&self) -> &DurableStore<F> {
        &self.store
    }

    pub fn apply_boot_action(&mut self, action: BootAction) -> BootOutcome {
        lkg::apply_boot_action(&mut self.store, action)
    }

    /// Run the one-shot decision left in [`BOOT_ACTION_PATH`] by the boot
    /// supervisor.  The marker is removed only once the action has run, so
    /// an interrupted restore or wipe is repeated on the next boot.
    pub fn apply_pending_boot_action(&mut self) -> (BootAction, BootOutcome) {
        let mut buf = [0u8; 1];
        let action = match self.store.read(BOOT_ACTION_PATH, &mut buf) {
            Ok(1) => BootAction::from_byte(buf[0]),
            Ok(_) | Err(StorageError::NotFound) => BootAction::Normal,
            Err(e) => {
                warn!("ConfigStore: boot action unreadable ({})", e);
                BootAction::Normal
            }
        };
        let outcome = self.apply_boot_action(action);

        if let Err(e) = self.store.remove(BOOT_ACTION_PATH) {
            warn!("ConfigStore: boot action marker not cleared ({})", e);
        } else {
            debug!("ConfigStore: boot action {:?} consumed", action);
        }
        (action, outcome)
    }

    /// Drive the last-known-good promotion timer.
    pub fn poll_lkg(&mut self, now_ms: u64) -> bool {
        self.lkg.poll(&mut self.store, now_ms)
    }

    pub fn lkg_armed(&self) -> bool {
        self.lkg.is_armed()
    }
}

impl<F: FileSystem> ConfigPort for ConfigStore<F> {
    fn load(&mut self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; CONFIG_MAX_LEN];
        let decoded = match self.store.read(CONFIG_PATH, &mut buf) {
            Ok(n) => postcard::from_bytes::<SystemConfig>(&buf[..n]).ok(),
            Err(StorageError::NotFound) => {
                info!("ConfigStore: no stored config, using defaults");
                return Ok(SystemConfig::default());
            }
            Err(StorageError::TooLarge) => None,
            Err(e) => return Err(e.into()),
        };

        match decoded {
            Some(cfg) if validate_config(&cfg).is_ok() => {
                info!("ConfigStore: loaded config from flash");
                self.lkg.arm();
                Ok(cfg)
            }
            _ => {
                warn!("ConfigStore: stored config corrupted, discarding");
                if let Err(e) = self.store.remove(CONFIG_PATH) {
                    warn!("ConfigStore: could not remove corrupted config ({})", e);
                }
                Err(ConfigError::Corrupted)
            }
        }
    }

    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.store.write_atomic(CONFIG_PATH, &bytes)?;
        self.lkg.arm();
        info!("ConfigStore: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
