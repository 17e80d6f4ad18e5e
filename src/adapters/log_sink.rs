//! Log-based snapshot sink adapter.
//!
//! Implements [`SnapshotSink`] by writing each published snapshot to the
//! ESP-IDF logger (UART / USB-CDC in production).  Display or network
//! consumers implement the same trait.

use core::fmt::Write;

use log::info;

use crate::app::ports::SnapshotSink;
use crate::hub::snapshot::SensorSnapshot;

/// Render an optional value, `--` when invalid.
fn field(out: &mut String, name: &str, v: Option<f32>, decimals: usize) {
    let _ = match v {
        Some(x) => write!(out, " {}={:.*}", name, decimals, x),
        None => write!(out, " {}=--", name),
    };
}

/// One-line `key=value` rendering of a snapshot.
pub fn format_snapshot(s: &SensorSnapshot) -> String {
    let mut out = String::with_capacity(192);
    field(&mut out, "T", s.temperature_c, 1);
    field(&mut out, "RH", s.humidity_pct, 1);
    field(&mut out, "PM1", s.pm1_0, 1);
    field(&mut out, "PM2.5", s.pm2_5, 1);
    field(&mut out, "PM4", s.pm4_0, 1);
    field(&mut out, "PM10", s.pm10_0, 1);
    field(&mut out, "CO2", s.co2_ppm, 0);
    field(&mut out, "VOC", s.voc_index, 0);
    field(&mut out, "NOx", s.nox_index, 0);
    field(&mut out, "HCHO", s.hcho_ppb, 0);
    field(&mut out, "CO", s.co_ppm, 1);
    field(&mut out, "P", s.pressure_hpa, 1);
    field(&mut out, "dP3h", s.pressure_delta_3h_hpa, 2);
    field(&mut out, "dP24h", s.pressure_delta_24h_hpa, 2);
    out
}

/// Adapter that logs every published snapshot to the serial console.
#[derive(Debug, Default)]
pub struct LogSnapshotSink {
    published: u32,
}

impl LogSnapshotSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u32 {
        self.published
    }
}

impl SnapshotSink for LogSnapshotSink {
    fn publish(&mut self, snapshot: &SensorSnapshot) {
        self.published = self.published.wrapping_add(1);
        info!("TELEM |{}", format_snapshot(snapshot));
    }
}
