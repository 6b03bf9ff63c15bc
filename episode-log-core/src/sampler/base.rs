use super::{SamplerStat, SamplingMode};
use crate::{DurableStore, EpisodeLogError, RecentCache, Record, Snapshot};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

static N_SAMPLERS_CREATED: AtomicU64 = AtomicU64::new(0);

/// Seed from the wall clock, mixed with a process-wide counter so that samplers
/// created at the same instant still get different streams.
fn time_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let n = N_SAMPLERS_CREATED.fetch_add(1, Ordering::Relaxed);
    nanos ^ n.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SamplerState {
    Active,
    Released,
}

/// Draws records uniformly at random from the active buffer of a [`RecentCache`].
///
/// Each sampler owns its random number generator. When the buffer it reads is empty,
/// the sampler refreshes the cache from the [`DurableStore`] and reads again.
///
/// The shared hold on the cache is taken inside each call to [`Sampler::sample()`],
/// not for the lifetime of the sampler, so a sampler can run a refresh while other
/// samplers, on this thread or others, are alive.
///
/// A sampler is released exactly once, by [`Sampler::release()`] or on drop.
pub struct Sampler<'a, S: DurableStore + ?Sized> {
    cache: &'a RecentCache,
    store: &'a S,
    mode: SamplingMode,
    pinned: Option<Snapshot>,
    rng: StdRng,
    stat: SamplerStat,
    state: SamplerState,
}

impl<'a, S: DurableStore + ?Sized> Sampler<'a, S> {
    /// Creates a sampler seeded from the wall clock.
    pub fn new(cache: &'a RecentCache, store: &'a S, mode: SamplingMode) -> Self {
        Self::with_seed(cache, store, mode, time_seed())
    }

    /// Creates a sampler with a given seed.
    pub fn with_seed(cache: &'a RecentCache, store: &'a S, mode: SamplingMode, seed: u64) -> Self {
        cache.register_sampler();
        Self {
            cache,
            store,
            mode,
            pinned: None,
            rng: StdRng::seed_from_u64(seed),
            stat: SamplerStat::default(),
            state: SamplerState::Active,
        }
    }

    /// Draws a record.
    ///
    /// Fails with [`EpisodeLogError::NoData`] if the store has no record, or with the
    /// error of the store if a refresh was needed and failed. A refresh needed while the
    /// current thread holds a [`Refresh`](crate::Refresh) of the same cache fails with
    /// [`EpisodeLogError::ReentrantRefresh`].
    pub fn sample(&mut self) -> Result<Record> {
        let snapshot = self.snapshot()?;
        let ix = self.rng.gen_range(0..snapshot.len());
        self.stat.n_samples += 1;
        Ok(snapshot.records()[ix].clone())
    }

    /// Draws `n` records from a single generation of the buffer.
    pub fn sample_batch(&mut self, n: usize) -> Result<Vec<Record>> {
        let snapshot = self.snapshot()?;
        let len = snapshot.len();
        let records = (0..n)
            .map(|_| snapshot.records()[self.rng.gen_range(0..len)].clone())
            .collect::<Vec<_>>();
        self.stat.n_samples += n;
        Ok(records)
    }

    /// Returns the stats of this sampler.
    pub fn stats(&self) -> &SamplerStat {
        &self.stat
    }

    /// The sampling mode.
    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Releases the sampler and returns its stats.
    pub fn release(mut self) -> SamplerStat {
        self.release_inner();
        self.stat.clone()
    }

    fn release_inner(&mut self) {
        if self.state == SamplerState::Active {
            self.state = SamplerState::Released;
            self.pinned = None;
            self.cache.unregister_sampler();
        }
    }

    /// Returns a non-empty buffer, refreshing the cache if needed.
    fn snapshot(&mut self) -> Result<Snapshot> {
        if let Some(pinned) = &self.pinned {
            return Ok(pinned.clone());
        }

        let mut snapshot = self.cache.active();
        if snapshot.is_empty() {
            if self
                .cache
                .refresh_from_after(self.store, snapshot.generation())?
                .is_some()
            {
                self.stat.n_refreshes += 1;
            }
            snapshot = self.cache.active();
        }
        if snapshot.is_empty() {
            return Err(EpisodeLogError::NoData.into());
        }

        if self.mode == SamplingMode::Pinned {
            self.pinned = Some(snapshot.clone());
        }
        Ok(snapshot)
    }
}

impl<S: DurableStore + ?Sized> Drop for Sampler<'_, S> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryStore;

    fn store_with(timestamps: &[u64]) -> Result<MemoryStore> {
        let store = MemoryStore::new();
        for &ts in timestamps {
            store.append(&Record::new(ts, "test", "").with_timestamp(ts))?;
        }
        Ok(store)
    }

    #[test]
    fn test_empty_store_yields_no_data() -> Result<()> {
        let store = MemoryStore::new();
        let cache = RecentCache::new(10);
        let mut sampler = Sampler::new(&cache, &store, SamplingMode::Latest);

        let err = sampler.sample().unwrap_err();
        assert_eq!(
            err.downcast_ref::<EpisodeLogError>(),
            Some(&EpisodeLogError::NoData)
        );
        assert!(sampler.sample_batch(3).is_err());
        Ok(())
    }

    #[test]
    fn test_sample_triggers_refresh_once() -> Result<()> {
        let store = store_with(&[1, 2, 3])?;
        let cache = RecentCache::new(10);
        let mut sampler = Sampler::new(&cache, &store, SamplingMode::Latest);

        for _ in 0..10 {
            let r = sampler.sample()?;
            assert!((1..=3).contains(&r.timestamp()));
        }
        assert_eq!(sampler.stats().n_samples, 10);
        assert_eq!(sampler.stats().n_refreshes, 1);
        assert_eq!(cache.generation(), 1);
        Ok(())
    }

    #[test]
    fn test_refresh_from_sampler_while_other_samplers_live() -> Result<()> {
        let store = store_with(&[1])?;
        let cache = RecentCache::new(10);
        let _other = Sampler::new(&cache, &store, SamplingMode::Latest);
        let mut sampler = Sampler::new(&cache, &store, SamplingMode::Latest);
        assert_eq!(sampler.sample()?.timestamp(), 1);
        Ok(())
    }

    #[test]
    fn test_pinned_sampler_keeps_generation() -> Result<()> {
        let store = store_with(&[1])?;
        let cache = RecentCache::new(10);
        let mut pinned = Sampler::new(&cache, &store, SamplingMode::Pinned);
        let mut latest = Sampler::new(&cache, &store, SamplingMode::Latest);
        assert_eq!(pinned.sample()?.timestamp(), 1);

        store.append(&Record::new(2, "test", "").with_timestamp(2))?;
        let mut refresh = cache.begin_refresh()?;
        refresh.push(Record::new(2, "test", "").with_timestamp(2))?;
        refresh.commit()?;

        for _ in 0..20 {
            assert_eq!(pinned.sample()?.timestamp(), 1);
            assert_eq!(latest.sample()?.timestamp(), 2);
        }
        Ok(())
    }

    #[test]
    fn test_release_unregisters_once() -> Result<()> {
        let store = store_with(&[1])?;
        let cache = RecentCache::new(10);
        let mut s1 = Sampler::new(&cache, &store, SamplingMode::Latest);
        let s2 = Sampler::new(&cache, &store, SamplingMode::Latest);
        assert_eq!(cache.stats().n_samplers, 2);

        s1.sample()?;
        let stat = s1.release();
        assert_eq!(stat.n_samples, 1);
        assert_eq!(cache.stats().n_samplers, 1);

        drop(s2);
        assert_eq!(cache.stats().n_samplers, 0);
        Ok(())
    }

    #[test]
    fn test_same_seed_same_sequence() -> Result<()> {
        let store = store_with(&(1..=100).collect::<Vec<_>>())?;
        let cache = RecentCache::new(100);
        let mut a = Sampler::with_seed(&cache, &store, SamplingMode::Latest, 7);
        let mut b = Sampler::with_seed(&cache, &store, SamplingMode::Latest, 7);
        let xs = a.sample_batch(50)?;
        let ys = b.sample_batch(50)?;
        assert_eq!(xs, ys);
        Ok(())
    }
}
