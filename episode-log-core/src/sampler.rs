//! Uniform sampling from the recent window.
mod base;
mod mode;
mod stat;
pub use base::Sampler;
pub use mode::SamplingMode;
pub use stat::SamplerStat;
