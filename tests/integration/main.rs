//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulated bus and in-memory flash.  All tests run on the
//! host (x86_64) with no real hardware required.

mod history_tests;
mod sim_bus;
mod storage_tests;
