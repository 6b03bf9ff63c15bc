/// Stats of a [`Sampler`](crate::Sampler).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SamplerStat {
    /// The number of records drawn.
    pub n_samples: usize,

    /// The number of refreshes committed by the sampler.
    pub n_refreshes: usize,
}
