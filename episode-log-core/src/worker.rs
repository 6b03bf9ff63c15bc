//! Background refresh of the recent cache.
mod base;
mod stat;
pub use base::RefreshWorker;
pub use stat::RefreshWorkerStat;
