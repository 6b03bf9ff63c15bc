//! In-memory store.
use super::{DurableStore, LastError};
use crate::Record;
use anyhow::{bail, Result};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::{Mutex, PoisonError},
};

/// A [`DurableStore`] keeping records in memory.
///
/// Nothing survives the process. Timestamps act as a primary key like in
/// database-backed stores: appending a record with a timestamp already stored fails.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<u64, Record>>,
    last_error: LastError,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn append_inner(&self, record: &Record) -> Result<()> {
        if record.timestamp() == 0 {
            bail!("record has no timestamp");
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.entry(record.timestamp()) {
            Entry::Occupied(_) => bail!("timestamp {} is already stored", record.timestamp()),
            Entry::Vacant(e) => {
                e.insert(record.clone());
            }
        }
        Ok(())
    }

    fn load_recent_inner(&self, max_n: usize) -> Vec<Record> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.values().rev().take(max_n).cloned().collect()
    }
}

impl DurableStore for MemoryStore {
    fn append(&self, record: &Record) -> Result<()> {
        self.last_error.track(self.append_inner(record))
    }

    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
        self.last_error.track(Ok(self.load_recent_inner(max_n)))
    }

    fn len(&self) -> Result<usize> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}
