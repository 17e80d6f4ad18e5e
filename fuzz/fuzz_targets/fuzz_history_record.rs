//! Fuzz target: `HistoryRecord::decode` and `PressureHistory::load`
//!
//! Whatever is found in `pressure.bin`, loading must not panic, and a
//! rejected file must be gone afterwards.
//!
//! cargo fuzz run fuzz_history_record

#![no_main]

use airsense::adapters::mem_fs::MemFs;
use airsense::app::ports::FileSystem;
use airsense::history::record::HistoryRecord;
use airsense::history::{CAPACITY, HistoryLoad, PressureHistory};
use airsense::storage::HISTORY_PATH;
use airsense::storage::durable::DurableStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(r) = HistoryRecord::decode(data) {
        assert!(usize::from(r.count) <= CAPACITY);
    }

    let mut fs = MemFs::new();
    let _ = fs.write(HISTORY_PATH, data);
    let mut store = DurableStore::new(fs.clone());
    let mut history = PressureHistory::new();
    match history.load(&mut store, Some(1_700_000_000)) {
        HistoryLoad::Discarded => {
            assert!(history.is_empty());
            assert!(!fs.exists(HISTORY_PATH));
        }
        _ => assert!(history.len() <= CAPACITY),
    }
});
