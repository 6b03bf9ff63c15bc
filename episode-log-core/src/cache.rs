//! Double-buffered cache of the most recent records.
mod recent;
mod snapshot;
mod stat;
mod swap_lock;
pub use recent::{RecentCache, Refresh};
pub use snapshot::Snapshot;
pub use stat::CacheStat;
pub use swap_lock::{ExclusiveHold, SharedHold, SwapLock};
