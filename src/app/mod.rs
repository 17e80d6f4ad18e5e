//! Application boundary.
//!
//! All interaction between the sensing core and the platform happens through
//! the **port traits** defined in [`ports`], keeping the hub, the drivers and
//! the persistence layer testable without real peripherals.

pub mod ports;
