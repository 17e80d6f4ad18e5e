//! Barometric pressure history and trend deltas.
//!
//! A 24 h ring of pressure samples at a 5-minute step yields the 3 h and
//! 24 h pressure tendency used for weather-style indications.  The ring is
//! persisted through the [`DurableStore`] so the trend survives reboots;
//! short outages are bridged by linear interpolation, long ones reset it.

pub mod record;

use log::{debug, info, warn};

use crate::app::ports::{FileSystem, StorageError};
use crate::storage::HISTORY_PATH;
use crate::storage::durable::DurableStore;
use record::{HistoryRecord, RECORD_LEN};

pub const CAPACITY: usize = 288;
pub const STEP_MS: u64 = 300_000;
pub const STEP_SECS: u32 = 300;
pub const SAVE_INTERVAL_MS: u64 = 1_800_000;

const STEPS_3H: usize = 36;
/// Outages shorter than this are ignored.
const GAP_FILL_MIN_SECS: u32 = 600;
/// Outages longer than this discard the history.
const GAP_FILL_MAX_SECS: u32 = 21_600;

/// Interpolation owed to the next recorded sample after a bridged outage.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingGap {
    from_hpa: f32,
    /// Steps between the last stored sample and the next new one.
    steps: usize,
}

/// Result of [`PressureHistory::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    /// Nothing stored.
    Empty,
    /// Restored as-is.
    Restored { count: usize },
    /// Restored; the outage will be bridged when the next sample arrives.
    GapPending { count: usize, steps: usize },
    /// Stored history was corrupt or too old and has been removed.
    Discarded,
}

pub struct PressureHistory {
    samples: [f32; CAPACITY],
    index: usize,
    count: usize,
    /// Wall-clock secs of the newest sample, 0 = unknown.
    newest_epoch: u32,
    last_record_ms: Option<u64>,
    last_save_ms: Option<u64>,
    pending_gap: Option<PendingGap>,
    dirty: bool,
}

impl Default for PressureHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureHistory {
    pub fn new() -> Self {
        Self {
            samples: [0.0; CAPACITY],
            index: 0,
            count: 0,
            newest_epoch: 0,
            last_record_ms: None,
            last_save_ms: None,
            pending_gap: None,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == CAPACITY
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Sample `k` steps before the newest one.
    fn back(&self, k: usize) -> f32 {
        self.samples[(self.index + CAPACITY - 1 - k) % CAPACITY]
    }

    pub fn newest(&self) -> Option<f32> {
        (self.count > 0).then(|| self.back(0))
    }

    /// Iterate live samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.count).rev().map(|k| self.back(k))
    }

    /// Unconditionally push one sample into the ring.
    pub fn append(&mut self, hpa: f32) {
        self.samples[self.index] = hpa;
        self.index = (self.index + 1) % CAPACITY;
        if self.count < CAPACITY {
            self.count += 1;
        }
        self.dirty = true;
    }

    /// Newest minus the sample three hours earlier.
    pub fn delta_3h(&self) -> Option<f32> {
        (self.count > STEPS_3H).then(|| self.back(0) - self.back(STEPS_3H))
    }

    /// Newest minus the oldest sample, once the ring has wrapped.
    pub fn delta_24h(&self) -> Option<f32> {
        self.is_full().then(|| self.back(0) - self.samples[self.index])
    }

    /// Record `hpa` if a step has passed since the last recorded sample.
    /// Returns `true` when the ring changed.
    pub fn record(&mut self, hpa: f32, now_ms: u64, epoch: Option<u32>) -> bool {
        if !hpa.is_finite() {
            return false;
        }
        if self
            .last_record_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < STEP_MS)
        {
            return false;
        }

        if let Some(gap) = self.pending_gap.take() {
            for k in 1..gap.steps {
                let f = k as f32 / gap.steps as f32;
                self.append(gap.from_hpa + (hpa - gap.from_hpa) * f);
            }
            debug!("History: bridged {} missing samples", gap.steps - 1);
        }

        self.append(hpa);
        self.last_record_ms = Some(now_ms);
        self.newest_epoch = epoch.unwrap_or(0);
        true
    }

    fn to_record(&self) -> HistoryRecord {
        HistoryRecord {
            epoch: self.newest_epoch,
            index: self.index as u16,
            count: self.count as u16,
            samples: self.samples,
        }
    }

    fn restore(&mut self, r: &HistoryRecord) {
        self.samples = r.samples;
        self.index = usize::from(r.index);
        self.count = usize::from(r.count);
        self.newest_epoch = r.epoch;
        self.pending_gap = None;
        self.dirty = false;
    }

    fn discard<F: FileSystem>(&mut self, store: &mut DurableStore<F>) -> HistoryLoad {
        *self = Self::new();
        if let Err(e) = store.remove(HISTORY_PATH) {
            warn!("History: could not remove stored history ({})", e);
        }
        HistoryLoad::Discarded
    }

    /// Restore the ring from flash.  `now_epoch` is the current wall clock,
    /// if known; without it the stored samples are taken at face value.
    pub fn load<F: FileSystem>(
        &mut self,
        store: &mut DurableStore<F>,
        now_epoch: Option<u32>,
    ) -> HistoryLoad {
        let mut buf = [0u8; RECORD_LEN];
        let record = match store.read(HISTORY_PATH, &mut buf) {
            Ok(n) => HistoryRecord::decode(&buf[..n]),
            Err(StorageError::NotFound) => {
                info!("History: no stored pressure history");
                return HistoryLoad::Empty;
            }
            Err(e) => {
                warn!("History: read failed ({}), discarding", e);
                return self.discard(store);
            }
        };

        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!("History: stored record invalid ({}), discarding", e);
                return self.discard(store);
            }
        };

        self.restore(&record);
        let count = self.count;

        let gap = match now_epoch {
            Some(now) if record.epoch != 0 && count > 0 => now.saturating_sub(record.epoch),
            _ => {
                info!("History: restored {} samples", count);
                return HistoryLoad::Restored { count };
            }
        };

        if gap > GAP_FILL_MAX_SECS {
            info!("History: {} s since last sample, starting fresh", gap);
            return self.discard(store);
        }
        if gap >= GAP_FILL_MIN_SECS {
            let steps = ((gap + STEP_SECS / 2) / STEP_SECS) as usize;
            if let Some(from_hpa) = self.newest() {
                self.pending_gap = Some(PendingGap { from_hpa, steps });
                info!("History: restored {} samples, bridging {} steps", count, steps);
                return HistoryLoad::GapPending { count, steps };
            }
        }

        info!("History: restored {} samples", count);
        HistoryLoad::Restored { count }
    }

    pub fn save<F: FileSystem>(
        &mut self,
        store: &mut DurableStore<F>,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        self.last_save_ms = Some(now_ms);
        store.write_atomic(HISTORY_PATH, &self.to_record().encode())?;
        self.dirty = false;
        debug!("History: saved {} samples", self.count);
        Ok(())
    }

    /// Persist every [`SAVE_INTERVAL_MS`] while there is unsaved data.
    pub fn save_if_due<F: FileSystem>(&mut self, store: &mut DurableStore<F>, now_ms: u64) -> bool {
        if self.count == 0 || !self.dirty {
            return false;
        }
        if self
            .last_save_ms
            .is_some_and(|t| now_ms.saturating_sub(t) < SAVE_INTERVAL_MS)
        {
            return false;
        }
        match self.save(store, now_ms) {
            Ok(()) => true,
            Err(e) => {
                warn!("History: save failed ({})", e);
                false
            }
        }
    }
}
