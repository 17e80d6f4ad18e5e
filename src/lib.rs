//! AirSense firmware library.
//!
//! The sensing and durability core of the monitor: sensor drivers, the
//! fusing hub, crash-safe blob storage and the pressure history.  Exposed
//! as a library so the host can run the integration and property tests
//! against the simulation backends. All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod pins;
pub mod sensors;
pub mod storage;
