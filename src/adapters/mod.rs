//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                    |
//! |-------------|---------------|--------------------------------|
//! | `flash_fs`  | FileSystem    | SPIFFS via ESP-IDF VFS         |
//! | `log_sink`  | SnapshotSink  | Serial log output              |
//! | `mem_fs`    | FileSystem    | In-memory map (host / tests)   |
//! | `time`      | Clock         | ESP32 system timer + RTC       |

pub mod flash_fs;
pub mod log_sink;
pub mod mem_fs;
pub mod time;
