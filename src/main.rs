//! AirSense firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FlashFs (SPIFFS)   Esp32TimeAdapter   LogSnapshotSink         │
//! │  (FileSystem)       (Clock)            (SnapshotSink)          │
//! │  I2cDriver + FreeRtos (embedded-hal I2c / DelayNs)             │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  SensorHub: SEN66 · SFA30 · CO · DPS310/BMP280          │    │
//! │  │  PressureHistory · SanityFilter                         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  DurableStore · ConfigStore (last-known-good)                  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use airsense::adapters::flash_fs::{self, FlashFs};
use airsense::adapters::log_sink::LogSnapshotSink;
use airsense::adapters::time::Esp32TimeAdapter;
use airsense::app::ports::{Clock, ConfigPort, SnapshotSink};
use airsense::config::SystemConfig;
use airsense::hub::SensorHub;
use airsense::pins;
use airsense::sensors::bus::SensorBus;
use airsense::storage::config_store::ConfigStore;
use airsense::storage::durable::DurableStore;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  AirSense v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Storage + boot action ──────────────────────────────
    flash_fs::mount_spiffs()?;
    let fs = FlashFs::new(flash_fs::MOUNT_POINT);
    let mut config_store = ConfigStore::new(DurableStore::new(fs));
    let (action, outcome) = config_store.apply_pending_boot_action();
    info!("Boot: action {:?} -> {:?}", action, outcome);

    let config = match config_store.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("Config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 3. Sensor bus ─────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    // SAFETY: the pin numbers come from the board map and are not claimed
    // by any other driver.
    let (sda, scl) = unsafe {
        (
            AnyIOPin::new(pins::I2C_SDA_GPIO),
            AnyIOPin::new(pins::I2C_SCL_GPIO),
        )
    };
    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ));
    let i2c = I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config)?;
    let bus = SensorBus::new(i2c, FreeRtos);

    // ── 4. Hub ────────────────────────────────────────────────
    // The hub gets its own handle on the data partition; the config
    // store keeps the other.
    let clock = Esp32TimeAdapter::new();
    let tick_ms = config.tick_interval_ms;
    let mut hub = SensorHub::new(
        bus,
        DurableStore::new(FlashFs::new(flash_fs::MOUNT_POINT)),
        config,
    );
    hub.begin(&clock);

    let mut sink = LogSnapshotSink::new();

    info!("System ready. Entering sensor loop.");

    // ── 5. Sensor loop ────────────────────────────────────────
    loop {
        if hub.tick(&clock) {
            sink.publish(hub.snapshot());
        }
        if config_store.poll_lkg(clock.now_ms()) {
            info!("Config promoted to last-known-good");
        }
        FreeRtos::delay_ms(tick_ms);
    }
}
