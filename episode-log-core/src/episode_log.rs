//! Store handle pairing a durable store with its recent cache.
use crate::{
    CacheStat, DurableStore, EpisodeLogConfig, RecentCache, Record, Sampler, SamplingMode,
};
use anyhow::Result;
use log::{debug, info, warn};

/// A durable record log with a cache of its most recent records.
///
/// Producers call [`EpisodeLog::append()`], which goes to the store only and never
/// waits for samplers. Consumers get a [`Sampler`] from [`EpisodeLog::sampler()`];
/// records appended after the last refresh stay invisible to samplers until the next
/// refresh, triggered by a sampler finding the cache empty, by
/// [`EpisodeLog::refresh()`] or by a [`RefreshWorker`](crate::RefreshWorker).
///
/// Wrap it in an [`Arc`](std::sync::Arc) to share it between threads.
///
/// ```rust
/// use episode_log_core::{EpisodeLog, EpisodeLogConfig, MemoryStore, Record};
///
/// # fn main() -> anyhow::Result<()> {
/// let log = EpisodeLog::new(MemoryStore::new(), EpisodeLogConfig::default().window(2))?;
/// for ts in [100, 200, 300].iter() {
///     log.append(Record::new(1, "worker-0", "").with_timestamp(*ts))?;
/// }
///
/// let mut sampler = log.sampler();
/// let record = sampler.sample()?;
/// assert!(record.timestamp() == 300 || record.timestamp() == 200);
/// # Ok(())
/// # }
/// ```
pub struct EpisodeLog<S: DurableStore> {
    store: S,
    cache: RecentCache,
    config: EpisodeLogConfig,
}

impl<S: DurableStore> EpisodeLog<S> {
    /// Builds a log on top of `store`.
    ///
    /// Fails if the configuration is invalid.
    pub fn new(store: S, config: EpisodeLogConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Opened episode log on {:?}, table {:?}, window {}",
            config.path, config.table_name, config.window
        );
        Ok(Self {
            store,
            cache: RecentCache::new(config.window),
            config,
        })
    }

    /// Persists a record and returns its timestamp.
    ///
    /// A record with timestamp `0` gets the current time. Failures are not retried; the
    /// description of the error is also available from [`EpisodeLog::last_error()`].
    pub fn append(&self, record: Record) -> Result<u64> {
        let record = record.stamped();
        if let Err(e) = self.store.append(&record) {
            warn!("Failed to append record {}: {:#}", record.timestamp(), e);
            return Err(e);
        }
        Ok(record.timestamp())
    }

    /// Returns the description of the error of the last store call.
    pub fn last_error(&self) -> Option<String> {
        self.store.last_error()
    }

    /// Creates a sampler with the configured sampling mode.
    pub fn sampler(&self) -> Sampler<'_, S> {
        self.sampler_with_mode(self.config.sampling_mode)
    }

    /// Creates a sampler with a given sampling mode.
    pub fn sampler_with_mode(&self, mode: SamplingMode) -> Sampler<'_, S> {
        Sampler::new(&self.cache, &self.store, mode)
    }

    /// Creates a sampler with a given sampling mode and seed.
    pub fn sampler_with_seed(&self, mode: SamplingMode, seed: u64) -> Sampler<'_, S> {
        Sampler::with_seed(&self.cache, &self.store, mode, seed)
    }

    /// Loads the recent window from the store into the cache.
    ///
    /// Returns the new generation. On failure, the cache is unchanged.
    pub fn refresh(&self) -> Result<u64> {
        match self.cache.refresh_from(&self.store) {
            Ok(generation) => {
                debug!(
                    "Refreshed {:?}, generation {}",
                    self.config.table_name, generation
                );
                Ok(generation)
            }
            Err(e) => {
                warn!("Failed to refresh {:?}: {:#}", self.config.table_name, e);
                Err(e)
            }
        }
    }

    /// The recent cache.
    pub fn cache(&self) -> &RecentCache {
        &self.cache
    }

    /// The durable store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configuration.
    pub fn config(&self) -> &EpisodeLogConfig {
        &self.config
    }

    /// Returns stats of the cache.
    pub fn stats(&self) -> CacheStat {
        self.cache.stats()
    }
}
