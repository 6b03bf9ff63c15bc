//! Stores used by the integration tests.
#![allow(dead_code)]
use anyhow::{bail, Result};
use episode_log_core::{DurableStore, LastError, MemoryStore, Record};
use std::{
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    thread,
    time::Duration,
};

pub fn record(ts: u64) -> Record {
    Record::new(ts, "test", format!("content-{}", ts)).with_timestamp(ts)
}

/// A [`MemoryStore`] whose loads can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_loads: AtomicBool,
    last_error: LastError,
}

impl FlakyStore {
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }
}

impl DurableStore for FlakyStore {
    fn append(&self, record: &Record) -> Result<()> {
        self.last_error.track(self.inner.append(record))
    }

    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
        let r = if self.fail_loads.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("disk I/O error"))
        } else {
            self.inner.load_recent(max_n)
        };
        self.last_error.track(r)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

/// Returns a full window of records per load, all tagged with the load number as
/// `game_id`. Loads take some time and are checked not to overlap.
#[derive(Default)]
pub struct GenerationStore {
    n_loads: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl GenerationStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn n_loads(&self) -> u64 {
        self.n_loads.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DurableStore for GenerationStore {
    fn append(&self, _record: &Record) -> Result<()> {
        bail!("read-only store");
    }

    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
        let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(n, Ordering::SeqCst);

        let load = self.n_loads.fetch_add(1, Ordering::SeqCst) + 1;
        let records = (0..max_n)
            .map(|i| {
                Record::new(load, "generation-store", "").with_timestamp(load * 1_000_000 - i as u64)
            })
            .collect::<Vec<_>>();
        thread::sleep(self.delay);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(records)
    }

    fn len(&self) -> Result<usize> {
        Ok(0)
    }

    fn last_error(&self) -> Option<String> {
        None
    }
}
