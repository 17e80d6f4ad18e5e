//! Durable storage across simulated reboots: config, last-known-good and
//! boot actions working together on one filesystem.

use airsense::adapters::mem_fs::MemFs;
use airsense::app::ports::{ConfigError, ConfigPort, FileSystem};
use airsense::config::SystemConfig;
use airsense::storage::config_store::ConfigStore;
use airsense::storage::durable::DurableStore;
use airsense::storage::lkg::{BootOutcome, LKG_PROMOTE_DELAY_MS};
use airsense::storage::{
    BOOT_ACTION_PATH, BootAction, CAL_BLOB_PATH, CONFIG_PATH, HISTORY_PATH, LKG_PATH,
};

/// A fresh boot on the same flash.
fn boot(fs: &MemFs, action: BootAction) -> (ConfigStore<MemFs>, BootOutcome) {
    let mut cs = ConfigStore::new(DurableStore::new(fs.clone()));
    let outcome = cs.apply_boot_action(action);
    (cs, outcome)
}

fn tuned() -> SystemConfig {
    SystemConfig {
        co2_asc_enabled: false,
        temperature_offset_c: -1.5,
        ..SystemConfig::default()
    }
}

#[test]
fn known_good_config_survives_a_bad_update() {
    let fs = MemFs::new();

    let (mut cs, outcome) = boot(&fs, BootAction::Normal);
    assert_eq!(outcome, BootOutcome::Untouched);
    cs.save(&tuned()).unwrap();
    assert!(!cs.poll_lkg(0));
    assert!(cs.poll_lkg(LKG_PROMOTE_DELAY_MS));
    assert!(cs.store().exists(LKG_PATH));

    // A later update that the supervisor decides was bad.
    let bad = SystemConfig {
        tick_interval_ms: 5000,
        ..tuned()
    };
    cs.save(&bad).unwrap();

    let (mut cs, outcome) = boot(&fs, BootAction::RestoreLastKnownGood);
    assert_eq!(outcome, BootOutcome::Restored);
    assert_eq!(cs.load().unwrap(), tuned());
}

#[test]
fn config_is_not_promoted_before_it_has_run() {
    let fs = MemFs::new();
    let (mut cs, _) = boot(&fs, BootAction::Normal);
    cs.save(&tuned()).unwrap();
    assert!(!cs.poll_lkg(1_000));
    assert!(!cs.poll_lkg(1_000 + LKG_PROMOTE_DELAY_MS - 1));
    assert!(!fs.exists(LKG_PATH));

    // Reboot before the delay: nothing to restore, so the restore wipes.
    let (mut cs, outcome) = boot(&fs, BootAction::RestoreLastKnownGood);
    assert_eq!(outcome, BootOutcome::Wiped);
    assert_eq!(cs.load().unwrap(), SystemConfig::default());
}

#[test]
fn factory_reset_clears_every_persisted_blob() {
    let fs = MemFs::new();
    {
        let mut store = DurableStore::new(fs.clone());
        for path in [CONFIG_PATH, LKG_PATH, CAL_BLOB_PATH, HISTORY_PATH] {
            store.write_atomic(path, b"payload").unwrap();
        }
    }
    let (_, outcome) = boot(&fs, BootAction::FactoryReset);
    assert_eq!(outcome, BootOutcome::Wiped);
    assert!(fs.paths().is_empty(), "left behind: {:?}", fs.paths());
}

#[test]
fn boot_action_marker_is_consumed_after_it_runs() {
    let fs = MemFs::new();
    let (mut cs, _) = boot(&fs, BootAction::Normal);
    cs.save(&tuned()).unwrap();
    fs.clone()
        .write(BOOT_ACTION_PATH, &[BootAction::FactoryReset.as_byte()])
        .unwrap();

    let mut cs = ConfigStore::new(DurableStore::new(fs.clone()));
    assert_eq!(
        cs.apply_pending_boot_action(),
        (BootAction::FactoryReset, BootOutcome::Wiped)
    );
    assert!(!fs.exists(CONFIG_PATH));
    assert!(!fs.exists(BOOT_ACTION_PATH));

    // The next boot finds no marker and leaves the new config alone.
    cs.save(&tuned()).unwrap();
    let mut cs = ConfigStore::new(DurableStore::new(fs.clone()));
    assert_eq!(
        cs.apply_pending_boot_action(),
        (BootAction::Normal, BootOutcome::Untouched)
    );
    assert_eq!(cs.load().unwrap(), tuned());
}

#[test]
fn interrupted_replace_is_repaired_at_boot() {
    let fs = MemFs::new();
    let good = postcard::to_allocvec(&tuned()).unwrap();
    {
        // Power lost after the old copy was moved aside and before the new
        // one was committed.
        let mut raw = fs.clone();
        raw.write("config.bin.bak", &good).unwrap();
        raw.write("config.bin.tmp", b"half-writ").unwrap();
    }

    let (mut cs, outcome) = boot(&fs, BootAction::Normal);
    assert_eq!(outcome, BootOutcome::Untouched);
    assert_eq!(fs.paths(), vec![CONFIG_PATH.to_string()]);
    assert_eq!(cs.load().unwrap(), tuned());
}

#[test]
fn corrupted_config_is_discarded_once() {
    let fs = MemFs::new();
    fs.clone().write(CONFIG_PATH, &[0xFF; 3]).unwrap();

    let (mut cs, _) = boot(&fs, BootAction::Normal);
    assert_eq!(cs.load(), Err(ConfigError::Corrupted));
    assert!(!fs.exists(CONFIG_PATH));
    assert!(!cs.lkg_armed());
    assert_eq!(cs.load().unwrap(), SystemConfig::default());
}

#[test]
fn invalid_config_is_never_written() {
    let fs = MemFs::new();
    let (mut cs, _) = boot(&fs, BootAction::Normal);
    let bad = SystemConfig {
        tick_interval_ms: 10,
        ..SystemConfig::default()
    };
    assert!(matches!(cs.save(&bad), Err(ConfigError::ValidationFailed(_))));
    assert!(fs.paths().is_empty());
}
