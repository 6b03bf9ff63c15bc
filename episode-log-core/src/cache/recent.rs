//! Two-slot cache with a serialized refresh protocol.
use super::{CacheStat, Snapshot, SwapLock};
use crate::{DurableStore, EpisodeLogError, Record};
use anyhow::Result;
use log::debug;
use std::{
    cell::RefCell,
    mem,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

static NEXT_CACHE_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Ids of the caches the current thread is refreshing.
    static REFRESHING: RefCell<Vec<usize>> = RefCell::new(Vec::new());
}

/// The slot readers see.
struct ActiveSlot {
    index: usize,
    generation: u64,
    records: Arc<Vec<Record>>,
}

/// The slot being refilled. Owned by the refresh serializer.
struct StagingSlot {
    index: usize,
    records: Vec<Record>,
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Double-buffered cache of the most recent records of a [`DurableStore`].
///
/// The cache has two slots. The active slot is published to readers through a
/// [`SwapLock`]; the staging slot sits behind a mutex, the refresh serializer, and is
/// only touched by the single refresh holding that mutex.
///
/// A refresh goes through [`RecentCache::begin_refresh()`], [`Refresh::push()`] for
/// each loaded record and [`Refresh::commit()`]:
///
/// ```mermaid
/// sequenceDiagram
///     participant R as Refresher
///     participant S as Staging (mutex)
///     participant A as Active (swap lock)
///     R->>S: lock, clear
///     R->>R: DurableStore::load_recent(window)
///     R->>S: push records
///     R->>A: exclusive hold, swap slots
///     R->>S: unlock
/// ```
///
/// The exclusive hold covers the slot swap only, never the load. Readers call
/// [`RecentCache::active()`], which takes a shared hold just long enough to clone an
/// [`Arc`] of the active buffer, so a thread never keeps a shared hold while it runs
/// a refresh.
///
/// A [`Refresh`] dropped without commit leaves the active buffer as it was. A thread
/// starting a refresh while its own refresh of the same cache is in progress gets
/// [`EpisodeLogError::ReentrantRefresh`].
pub struct RecentCache {
    id: usize,
    window: usize,
    active: SwapLock<ActiveSlot>,
    staging: Mutex<StagingSlot>,
    n_aborts: AtomicU64,
    n_samplers: AtomicUsize,
}

impl RecentCache {
    /// Creates an empty cache holding at most `window` records per generation.
    pub fn new(window: usize) -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            window,
            active: SwapLock::new(ActiveSlot {
                index: 0,
                generation: 0,
                records: Arc::new(Vec::new()),
            }),
            staging: Mutex::new(StagingSlot {
                index: 1,
                records: Vec::with_capacity(window),
            }),
            n_aborts: AtomicU64::new(0),
            n_samplers: AtomicUsize::new(0),
        }
    }

    /// The maximum number of records per generation.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Returns the active buffer.
    pub fn active(&self) -> Snapshot {
        let active = self.active.read();
        Snapshot::new(active.generation, active.index, active.records.clone())
    }

    /// Index of the active slot.
    pub fn active_index(&self) -> usize {
        self.active.read().index
    }

    /// The number of committed refreshes.
    pub fn generation(&self) -> u64 {
        self.active.read().generation
    }

    /// Returns `true` if the current thread holds a [`Refresh`] of this cache.
    pub fn refreshing_on_current_thread(&self) -> bool {
        REFRESHING.with(|ids| ids.borrow().contains(&self.id))
    }

    /// Starts a refresh, blocking while another thread is refreshing.
    ///
    /// The staging buffer is cleared before returning. Fails with
    /// [`EpisodeLogError::ReentrantRefresh`] if the current thread is refreshing already.
    pub fn begin_refresh(&self) -> Result<Refresh<'_>, EpisodeLogError> {
        let staging = self.lock_staging()?;
        Ok(Refresh::new(self, staging))
    }

    /// Starts a refresh unless one was committed after `generation`.
    ///
    /// Returns `None` if the active generation moved past `generation` while waiting
    /// for the serializer, i.e., another thread already did the refresh.
    pub fn begin_refresh_after(
        &self,
        generation: u64,
    ) -> Result<Option<Refresh<'_>>, EpisodeLogError> {
        let staging = self.lock_staging()?;
        if self.generation() != generation {
            self.leave_refresh();
            return Ok(None);
        }
        Ok(Some(Refresh::new(self, staging)))
    }

    fn lock_staging(&self) -> Result<MutexGuard<'_, StagingSlot>, EpisodeLogError> {
        if self.refreshing_on_current_thread() {
            return Err(EpisodeLogError::ReentrantRefresh);
        }
        let staging = self.staging.lock().unwrap_or_else(PoisonError::into_inner);
        REFRESHING.with(|ids| ids.borrow_mut().push(self.id));
        Ok(staging)
    }

    fn leave_refresh(&self) {
        // The thread-local may already be gone while the thread is exiting
        let _ = REFRESHING.try_with(|ids| {
            let mut ids = ids.borrow_mut();
            if let Some(ix) = ids.iter().position(|&id| id == self.id) {
                ids.swap_remove(ix);
            }
        });
    }

    /// Loads the recent window from `store` and makes it active.
    ///
    /// Returns the new generation. On failure, the active buffer is unchanged.
    pub fn refresh_from<S: DurableStore + ?Sized>(&self, store: &S) -> Result<u64> {
        let refresh = self.begin_refresh()?;
        refresh.load(store)
    }

    /// Same as [`RecentCache::refresh_from()`], skipped if a refresh was committed after
    /// `generation`.
    ///
    /// Returns `Some(new_generation)` if this call committed a refresh.
    pub fn refresh_from_after<S: DurableStore + ?Sized>(
        &self,
        store: &S,
        generation: u64,
    ) -> Result<Option<u64>> {
        match self.begin_refresh_after(generation)? {
            Some(refresh) => Ok(Some(refresh.load(store)?)),
            None => Ok(None),
        }
    }

    /// Returns stats of the cache.
    pub fn stats(&self) -> CacheStat {
        let active = self.active();
        CacheStat {
            generation: active.generation(),
            active_index: active.slot(),
            active_len: active.len(),
            n_aborts: self.n_aborts.load(Ordering::Relaxed),
            n_samplers: self.n_samplers.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn register_sampler(&self) {
        self.n_samplers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unregister_sampler(&self) {
        self.n_samplers.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An in-progress refresh of a [`RecentCache`].
///
/// Holds the refresh serializer until committed or dropped.
pub struct Refresh<'a> {
    cache: &'a RecentCache,
    staging: MutexGuard<'a, StagingSlot>,
    committed: bool,
}

impl<'a> Refresh<'a> {
    fn new(cache: &'a RecentCache, mut staging: MutexGuard<'a, StagingSlot>) -> Self {
        staging.records.clear();
        Self {
            cache,
            staging,
            committed: false,
        }
    }

    /// Appends a record to the staging buffer.
    ///
    /// Fails with [`EpisodeLogError::StagingOverflow`] if the staging buffer already
    /// holds a full window.
    pub fn push(&mut self, record: Record) -> Result<(), EpisodeLogError> {
        if self.staging.records.len() >= self.cache.window {
            return Err(EpisodeLogError::StagingOverflow {
                window: self.cache.window,
            });
        }
        self.staging.records.push(record);
        Ok(())
    }

    /// The number of records pushed so far.
    pub fn len(&self) -> usize {
        self.staging.records.len()
    }

    /// Returns `true` if nothing was pushed yet.
    pub fn is_empty(&self) -> bool {
        self.staging.records.is_empty()
    }

    /// Makes the staging buffer active and returns the new generation.
    ///
    /// Fails with [`EpisodeLogError::ReentrantSwap`] if the current thread has a shared
    /// hold on the cache; the refresh is then dropped and the active buffer unchanged.
    pub fn commit(mut self) -> Result<u64, EpisodeLogError> {
        let filled = Arc::new(mem::take(&mut self.staging.records));
        let (generation, retired) = {
            let mut active = match self.cache.active.write() {
                Ok(active) => active,
                Err(e) => {
                    // Put the records back so that the drop path sees an aborted refresh
                    if let Ok(records) = Arc::try_unwrap(filled) {
                        self.staging.records = records;
                    }
                    return Err(e);
                }
            };
            let retired = mem::replace(&mut active.records, filled);
            mem::swap(&mut active.index, &mut self.staging.index);
            active.generation += 1;
            (active.generation, retired)
        };
        self.committed = true;

        // Reuses the allocation of the retired buffer unless a snapshot still holds it
        if let Ok(mut records) = Arc::try_unwrap(retired) {
            records.clear();
            self.staging.records = records;
        }

        debug!("Committed refresh, generation {}", generation);
        Ok(generation)
    }

    fn load<S: DurableStore + ?Sized>(mut self, store: &S) -> Result<u64> {
        let records = store.load_recent(self.cache.window)?;
        for record in records {
            self.push(record)?;
        }
        Ok(self.commit()?)
    }
}

impl Drop for Refresh<'_> {
    fn drop(&mut self) {
        self.cache.leave_refresh();
        if !self.committed {
            debug!(
                "Dropped refresh with {} staged records",
                self.staging.records.len()
            );
            self.staging.records.clear();
            self.cache.n_aborts.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{MemoryStore, Sampler, SamplingMode};

    fn record(ts: u64) -> Record {
        Record::new(ts, "test", "").with_timestamp(ts)
    }

    fn timestamps(snapshot: &Snapshot) -> Vec<u64> {
        snapshot.iter().map(|r| r.timestamp()).collect()
    }

    #[test]
    fn test_commit_flips_active_slot() -> Result<()> {
        let cache = RecentCache::new(4);
        assert_eq!(cache.active_index(), 0);
        assert!(cache.active().is_empty());

        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(2))?;
        refresh.push(record(1))?;
        assert_eq!(refresh.commit()?, 1);

        let active = cache.active();
        assert_eq!(active.slot(), 1);
        assert_eq!(active.generation(), 1);
        assert_eq!(timestamps(&active), vec![2, 1]);

        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(3))?;
        refresh.commit()?;
        assert_eq!(cache.active_index(), 0);
        assert_eq!(timestamps(&cache.active()), vec![3]);

        // The old snapshot still sees its own generation
        assert_eq!(timestamps(&active), vec![2, 1]);
        Ok(())
    }

    #[test]
    fn test_staging_is_invisible_until_commit() -> Result<()> {
        let cache = RecentCache::new(4);
        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(1))?;
        assert!(cache.active().is_empty());
        assert_eq!(cache.generation(), 0);
        refresh.commit()?;
        assert_eq!(cache.active().len(), 1);
        Ok(())
    }

    #[test]
    fn test_dropped_refresh_keeps_active_buffer() -> Result<()> {
        let cache = RecentCache::new(4);
        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(1))?;
        refresh.commit()?;

        {
            let mut refresh = cache.begin_refresh()?;
            refresh.push(record(5))?;
            refresh.push(record(4))?;
        }
        let active = cache.active();
        assert_eq!(active.generation(), 1);
        assert_eq!(timestamps(&active), vec![1]);
        assert_eq!(cache.stats().n_aborts, 1);

        // The next refresh starts from an empty staging buffer
        let refresh = cache.begin_refresh()?;
        assert!(refresh.is_empty());
        Ok(())
    }

    #[test]
    fn test_push_beyond_window_fails() -> Result<()> {
        let cache = RecentCache::new(2);
        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(3))?;
        refresh.push(record(2))?;
        assert_eq!(
            refresh.push(record(1)),
            Err(EpisodeLogError::StagingOverflow { window: 2 })
        );
        assert_eq!(refresh.len(), 2);
        Ok(())
    }

    #[test]
    fn test_commit_under_shared_hold_is_rejected() -> Result<()> {
        let cache = RecentCache::new(2);
        let hold = cache.active.read();
        let mut refresh = cache.begin_refresh()?;
        refresh.push(record(1))?;
        assert_eq!(refresh.commit(), Err(EpisodeLogError::ReentrantSwap));
        drop(hold);

        assert!(cache.active().is_empty());
        assert_eq!(cache.stats().n_aborts, 1);
        Ok(())
    }

    #[test]
    fn test_refresh_within_refresh_is_rejected() -> Result<()> {
        let store = MemoryStore::new();
        store.append(&record(1))?;
        let cache = RecentCache::new(2);

        let refresh = cache.begin_refresh()?;
        assert!(cache.refreshing_on_current_thread());
        assert_eq!(
            cache.begin_refresh().err(),
            Some(EpisodeLogError::ReentrantRefresh)
        );
        assert_eq!(
            cache.begin_refresh_after(0).err(),
            Some(EpisodeLogError::ReentrantRefresh)
        );

        // A sampler finding the cache empty fails instead of waiting for itself
        let err = Sampler::new(&cache, &store, SamplingMode::Latest)
            .sample()
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<EpisodeLogError>(),
            Some(&EpisodeLogError::ReentrantRefresh)
        );

        drop(refresh);
        assert!(!cache.refreshing_on_current_thread());
        assert_eq!(cache.refresh_from(&store)?, 1);
        assert_eq!(timestamps(&cache.active()), vec![1]);
        Ok(())
    }

    #[test]
    fn test_skipped_refresh_releases_serializer() -> Result<()> {
        let store = MemoryStore::new();
        store.append(&record(1))?;
        let cache = RecentCache::new(2);
        cache.refresh_from(&store)?;

        assert!(cache.begin_refresh_after(0)?.is_none());
        assert!(!cache.refreshing_on_current_thread());
        assert!(cache.begin_refresh_after(1)?.is_some());
        Ok(())
    }

    #[test]
    fn test_refresh_from_store() -> Result<()> {
        let store = MemoryStore::new();
        for ts in 1..=5 {
            store.append(&record(ts))?;
        }
        let cache = RecentCache::new(3);
        assert_eq!(cache.refresh_from(&store)?, 1);
        assert_eq!(timestamps(&cache.active()), vec![5, 4, 3]);
        Ok(())
    }

    #[test]
    fn test_refresh_after_skips_stale_request() -> Result<()> {
        let store = MemoryStore::new();
        store.append(&record(1))?;
        let cache = RecentCache::new(3);

        assert_eq!(cache.refresh_from_after(&store, 0)?, Some(1));
        // Another caller that also saw generation 0 does not load again
        assert_eq!(cache.refresh_from_after(&store, 0)?, None);
        assert_eq!(cache.generation(), 1);
        Ok(())
    }
}
