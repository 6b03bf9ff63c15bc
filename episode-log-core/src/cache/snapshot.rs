//! Read-only view of the active buffer.
use crate::Record;
use std::{slice::Iter, sync::Arc};

/// An immutable view of one generation of the active buffer.
///
/// Cloning is cheap. A snapshot keeps its records alive after the cache has moved on
/// to a newer generation, so it never changes under its holder.
#[derive(Clone, Debug)]
pub struct Snapshot {
    generation: u64,
    slot: usize,
    records: Arc<Vec<Record>>,
}

impl Snapshot {
    pub(super) fn new(generation: u64, slot: usize, records: Arc<Vec<Record>>) -> Self {
        Self {
            generation,
            slot,
            records,
        }
    }

    /// Number of committed refreshes before this buffer became active.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Index of the cache slot, `0` or `1`, holding the buffer.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if there is no record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the `ix`-th record, newest first.
    pub fn get(&self, ix: usize) -> Option<&Record> {
        self.records.get(ix)
    }

    /// Records, newest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterates over the records, newest first.
    pub fn iter(&self) -> Iter<'_, Record> {
        self.records.iter()
    }

    /// Returns `true` if both snapshots share the same buffer.
    pub fn ptr_eq(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}
