#![warn(missing_docs)]
//! Durable episode log with a double-buffered cache for uniform sampling.
//!
//! Producers append [`Record`]s to a [`DurableStore`]. Consumers draw records uniformly
//! at random from the most recent window of the store through [`Sampler`]s, which read
//! an immutable buffer of a [`RecentCache`] while a refresh fills the other buffer.
//!
//! [`EpisodeLog`] ties a store, its cache and the configuration together.
pub mod cache;
pub mod error;
pub mod record;
pub mod sampler;
pub mod store;
pub mod worker;

mod config;
mod episode_log;
pub use cache::{CacheStat, RecentCache, Refresh, Snapshot, SwapLock};
pub use config::EpisodeLogConfig;
pub use episode_log::EpisodeLog;
pub use error::EpisodeLogError;
pub use record::Record;
pub use sampler::{Sampler, SamplerStat, SamplingMode};
pub use store::{DurableStore, LastError, MemoryStore};
pub use worker::{RefreshWorker, RefreshWorkerStat};
