//! Interface of durable record stores.
use crate::Record;
use anyhow::Result;
use std::sync::{Mutex, PoisonError};

/// Append-only storage of [`Record`]s.
///
/// The cache depends on the storage engine only through this trait, so that
/// [`RecentCache`](crate::RecentCache) and [`Sampler`](crate::Sampler) can run on
/// [`MemoryStore`](crate::MemoryStore) or on a test fake as well as on a database.
///
/// Implementations are shared between threads; methods take `&self` and do their
/// own locking.
///
/// # Examples
///
/// ```ignore
/// struct VecStore {
///     records: Mutex<Vec<Record>>,
/// }
///
/// impl DurableStore for VecStore {
///     fn append(&self, record: &Record) -> Result<()> {
///         self.records.lock().unwrap().push(record.clone());
///         Ok(())
///     }
///
///     fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
///         Ok(self.records.lock().unwrap().iter().rev().take(max_n).cloned().collect())
///     }
///
///     fn len(&self) -> Result<usize> {
///         Ok(self.records.lock().unwrap().len())
///     }
///
///     fn last_error(&self) -> Option<String> {
///         None
///     }
/// }
/// ```
pub trait DurableStore: Send + Sync {
    /// Persists a record.
    ///
    /// The record is expected to carry a non-zero timestamp; see
    /// [`Record::stamped()`]. On failure, the description of the error is also kept
    /// for [`DurableStore::last_error()`].
    fn append(&self, record: &Record) -> Result<()>;

    /// Returns up to `max_n` of the most recently appended records, newest first.
    ///
    /// Returns an empty vector if the store is empty.
    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>>;

    /// Returns the number of stored records.
    fn len(&self) -> Result<usize>;

    /// Returns the description of the error of the last call, `None` if it succeeded.
    fn last_error(&self) -> Option<String>;
}

impl<S: DurableStore + ?Sized> DurableStore for Box<S> {
    fn append(&self, record: &Record) -> Result<()> {
        (**self).append(record)
    }

    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
        (**self).load_recent(max_n)
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn last_error(&self) -> Option<String> {
        (**self).last_error()
    }
}

/// Keeps the description of the error of the last store call.
#[derive(Debug, Default)]
pub struct LastError(Mutex<Option<String>>);

impl LastError {
    /// Passes `result` through, remembering its error or clearing the last one.
    pub fn track<T>(&self, result: Result<T>) -> Result<T> {
        let mut last = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *last = match &result {
            Ok(_) => None,
            Err(e) => Some(format!("{:#}", e)),
        };
        result
    }

    /// Returns the remembered description.
    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
