//! Errors in the library.
use thiserror::Error;

/// Errors raised by the episode log.
///
/// Failures coming from a [`DurableStore`](crate::DurableStore) are propagated as
/// [`anyhow::Error`] as they are. The variants here are the conditions the cache and
/// samplers detect by themselves; callers can tell them apart with
/// [`anyhow::Error::downcast_ref`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EpisodeLogError {
    /// No record is available for sampling, even after a refresh.
    #[error("no records available")]
    NoData,

    /// The current thread asked for the exclusive hold of a [`SwapLock`](crate::SwapLock)
    /// while holding a shared hold of the same lock.
    #[error("exclusive hold requested while the current thread holds a shared hold")]
    ReentrantSwap,

    /// The current thread started a refresh while its own refresh of the same cache is
    /// still in progress.
    #[error("refresh started while the current thread is refreshing the same cache")]
    ReentrantRefresh,

    /// A refresh tried to push more records than the recent window holds.
    #[error("staging buffer overflow: the window holds {window} records")]
    StagingOverflow {
        /// The size of the recent window.
        window: usize,
    },

    /// Table name rejected by a store.
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
