use serde::{Deserialize, Serialize};

/// Which buffer a [`Sampler`](crate::Sampler) draws from.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum SamplingMode {
    /// Every call reads the buffer active at call time.
    Latest,

    /// The sampler keeps the first non-empty buffer it reads for its whole lifetime.
    ///
    /// Refreshes committed later are not seen by the sampler.
    Pinned,
}

impl Default for SamplingMode {
    fn default() -> Self {
        Self::Latest
    }
}
