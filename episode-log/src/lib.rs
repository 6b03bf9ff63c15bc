//! A durable episode log with a double-buffered cache for uniform sampling.
//!
//! The log consists of the following crates:
//!
//! * [episode-log-core](episode_log_core) provides [`Record`], the [`DurableStore`] trait,
//!   [`RecentCache`] with its two buffers, [`Sampler`], [`EpisodeLog`] and
//!   [`RefreshWorker`]. It also has [`MemoryStore`], a store without persistence.
//! * [episode-log-sqlite](episode_log_sqlite) has [`SqliteStore`], which keeps records
//!   in a table of an SQLite database.
//! * `episode-log` re-exports both and builds the `episode-log` command line tool.
pub use episode_log_core::{
    cache, error, record, sampler, store, worker, CacheStat, DurableStore, EpisodeLog,
    EpisodeLogConfig, EpisodeLogError, LastError, MemoryStore, RecentCache, Record, Refresh,
    RefreshWorker, RefreshWorkerStat, Sampler, SamplerStat, SamplingMode, Snapshot, SwapLock,
};
pub use episode_log_sqlite::{open_episode_log, SqliteStore};
