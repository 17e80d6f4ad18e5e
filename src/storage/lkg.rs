//! Last-known-good configuration protocol.
//!
//! A configuration that has been loaded (or saved) and then survived
//! [`LKG_PROMOTE_DELAY_MS`] without another write is copied to
//! `config.lkg`.  The boot supervisor can later ask for that copy to be
//! restored when the current configuration keeps crashing the device.

use log::{debug, error, info, warn};

use super::durable::DurableStore;
use super::{BootAction, CONFIG_PATH, LKG_PATH, PERSISTED_PATHS};
use crate::app::ports::{FileSystem, StorageError};

pub const LKG_PROMOTE_DELAY_MS: u64 = 300_000;

/// What [`apply_boot_action`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    Untouched,
    Restored,
    Wiped,
}

/// Promotion timer.  Armed by config load/save, started on the first poll
/// after arming, so it measures time the configuration actually ran.
#[derive(Debug, Default)]
pub struct LastKnownGood {
    armed: bool,
    since_ms: Option<u64>,
}

impl LastKnownGood {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start the promotion countdown.
    pub fn arm(&mut self) {
        self.armed = true;
        self.since_ms = None;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.since_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Promote the current config once the delay has passed.  Returns
    /// `true` when `config.lkg` was written.
    pub fn poll<F: FileSystem>(&mut self, store: &mut DurableStore<F>, now_ms: u64) -> bool {
        if !self.armed {
            return false;
        }
        let since = *self.since_ms.get_or_insert(now_ms);
        if now_ms.saturating_sub(since) < LKG_PROMOTE_DELAY_MS {
            return false;
        }

        match store.copy(CONFIG_PATH, LKG_PATH) {
            Ok(()) => {
                info!("LKG: configuration promoted to last-known-good");
                self.disarm();
                true
            }
            Err(StorageError::NotFound) => {
                debug!("LKG: no stored configuration to promote");
                self.disarm();
                false
            }
            Err(e) => {
                warn!("LKG: promotion failed ({}), will retry", e);
                self.since_ms = Some(now_ms);
                false
            }
        }
    }
}

fn wipe<F: FileSystem>(store: &mut DurableStore<F>) {
    for path in PERSISTED_PATHS {
        if let Err(e) = store.remove(path) {
            warn!("LKG: could not remove {} ({})", path, e);
        }
    }
}

/// Act on the supervisor's decision.  Runs before anything else reads
/// persisted state; interrupted writes are repaired first.
pub fn apply_boot_action<F: FileSystem>(
    store: &mut DurableStore<F>,
    action: BootAction,
) -> BootOutcome {
    for path in PERSISTED_PATHS {
        if let Err(e) = store.recover(path) {
            warn!("LKG: recovery of {} failed ({})", path, e);
        }
    }

    match action {
        BootAction::Normal => BootOutcome::Untouched,
        BootAction::RestoreLastKnownGood => {
            if !store.exists(LKG_PATH) {
                warn!("LKG: no last-known-good configuration, wiping instead");
                wipe(store);
                return BootOutcome::Wiped;
            }
            match store.copy(LKG_PATH, CONFIG_PATH) {
                Ok(()) => {
                    info!("LKG: last-known-good configuration restored");
                    BootOutcome::Restored
                }
                Err(e) => {
                    error!("LKG: restore failed ({}), wiping", e);
                    wipe(store);
                    BootOutcome::Wiped
                }
            }
        }
        BootAction::FactoryReset => {
            info!("LKG: factory reset");
            wipe(store);
            BootOutcome::Wiped
        }
    }
}
