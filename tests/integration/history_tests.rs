//! Pressure history through the hub: a simulated day on a DPS310 with a
//! steady rise, then reboots with and without an outage.

use airsense::adapters::mem_fs::MemFs;
use airsense::app::ports::{Clock, FileSystem};
use airsense::config::SystemConfig;
use airsense::history::{CAPACITY, STEP_MS, STEP_SECS};
use airsense::hub::SensorHub;
use airsense::sensors::bus::SensorBus;
use airsense::storage::HISTORY_PATH;
use airsense::storage::durable::DurableStore;

use crate::sim_bus::{FakeClock, NoDelay, Rig, SimBus};

const EPOCH: u32 = 1_700_000_000;
/// Rise per 5-minute step.
const SLOPE_HPA: f32 = 0.1;

fn dps_rig() -> Rig {
    let rig = Rig::new();
    rig.bus.attach(0x77, &rig.dps310);
    rig
}

fn hub_on(rig: &Rig, fs: &MemFs) -> SensorHub<SimBus, NoDelay, MemFs> {
    SensorHub::new(
        SensorBus::new(rig.bus.clone(), NoDelay),
        DurableStore::new(fs.clone()),
        SystemConfig::default(),
    )
}

fn close(v: Option<f32>, expected: f32) -> bool {
    v.is_some_and(|x| (x - expected).abs() < 0.05)
}

/// One sample per step for `steps` steps, rising by `SLOPE_HPA` each.
fn run_day(rig: &Rig, fs: &MemFs, clock: &FakeClock, steps: usize) -> SensorHub<SimBus, NoDelay, MemFs> {
    let mut hub = hub_on(rig, fs);
    hub.begin(clock);
    for k in 0..steps {
        rig.dps310
            .borrow_mut()
            .set_pressure_hpa(1000.0 + SLOPE_HPA * k as f32);
        hub.tick(clock);
        clock.advance(STEP_MS);
    }
    hub
}

#[test]
fn deltas_appear_as_the_ring_fills() {
    let rig = dps_rig();
    let fs = MemFs::new();
    let clock = FakeClock::new(0, Some(EPOCH));

    let mut hub = run_day(&rig, &fs, &clock, 36);
    assert_eq!(hub.snapshot().pressure_delta_3h_hpa, None);

    rig.dps310.borrow_mut().set_pressure_hpa(1000.0 + SLOPE_HPA * 36.0);
    hub.tick(&clock);
    assert!(close(hub.snapshot().pressure_delta_3h_hpa, 3.6));
    assert_eq!(hub.snapshot().pressure_delta_24h_hpa, None);
}

#[test]
fn full_day_reports_both_deltas() {
    let rig = dps_rig();
    let fs = MemFs::new();
    let clock = FakeClock::new(0, Some(EPOCH));

    let hub = run_day(&rig, &fs, &clock, CAPACITY + 1);
    let s = *hub.snapshot();
    assert!(hub.history().is_full());
    assert!(close(s.pressure_delta_3h_hpa, 36.0 * SLOPE_HPA), "{:?}", s);
    assert!(close(s.pressure_delta_24h_hpa, 287.0 * SLOPE_HPA), "{:?}", s);
    assert!(fs.exists(HISTORY_PATH), "saved on the regular cadence");
}

#[test]
fn outage_is_bridged_on_reboot() {
    let rig = dps_rig();
    let fs = MemFs::new();
    let clock = FakeClock::new(0, Some(EPOCH));

    let mut hub = run_day(&rig, &fs, &clock, 40);
    hub.persist_now(clock.now_ms()).unwrap();
    let before = hub.history().len();
    let last = hub.history().newest().unwrap();
    drop(hub);

    // Eight steps after the newest stored sample, seven of them missed.
    let rig = dps_rig();
    let clock = FakeClock::new(0, Some(EPOCH + 39 * STEP_SECS + 8 * STEP_SECS));
    let mut hub = hub_on(&rig, &fs);
    hub.begin(&clock);
    assert_eq!(hub.history().len(), before);

    let now_hpa = last + 0.8;
    rig.dps310.borrow_mut().set_pressure_hpa(now_hpa);
    hub.tick(&clock);

    let samples: Vec<f32> = hub.history().iter().collect();
    assert_eq!(samples.len(), before + 8);
    let bridged = &samples[before..];
    for (k, v) in bridged.iter().enumerate() {
        let expected = last + 0.1 * (k + 1) as f32;
        assert!((v - expected).abs() < 0.05, "step {}: {} vs {}", k, v, expected);
    }
}

#[test]
fn stale_history_is_dropped_on_reboot() {
    let rig = dps_rig();
    let fs = MemFs::new();
    let clock = FakeClock::new(0, Some(EPOCH));
    let mut hub = run_day(&rig, &fs, &clock, 10);
    hub.persist_now(clock.now_ms()).unwrap();
    drop(hub);

    let clock = FakeClock::new(0, Some(EPOCH + 10 * STEP_SECS + 7 * 3600));
    let mut hub = hub_on(&dps_rig(), &fs);
    hub.begin(&clock);
    assert!(hub.history().is_empty());
    assert!(!fs.exists(HISTORY_PATH));
    assert_eq!(hub.snapshot().pressure_delta_3h_hpa, None);
}
