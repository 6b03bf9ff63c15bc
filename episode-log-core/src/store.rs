//! Durable storage consumed by the cache.
mod base;
mod memory;
pub use base::{DurableStore, LastError};
pub use memory::MemoryStore;
