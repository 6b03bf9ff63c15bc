/// Stats of a [`RecentCache`](crate::RecentCache).
#[derive(Clone, Debug, PartialEq)]
pub struct CacheStat {
    /// The number of committed refreshes.
    pub generation: u64,

    /// Index of the active slot.
    pub active_index: usize,

    /// The number of records in the active buffer.
    pub active_len: usize,

    /// The number of refreshes dropped without being committed.
    pub n_aborts: u64,

    /// The number of live [`Sampler`](crate::Sampler)s.
    pub n_samplers: usize,
}

impl CacheStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let mut s = "generation, active slot, records, aborted refreshes, samplers\n".to_string();
        s += format!(
            "{}, {}, {}, {}, {}\n",
            self.generation, self.active_index, self.active_len, self.n_aborts, self.n_samplers
        )
        .as_str();
        s
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fmt() {
        let stat = CacheStat {
            generation: 3,
            active_index: 1,
            active_len: 20,
            n_aborts: 0,
            n_samplers: 2,
        };
        let s = stat.fmt();
        let lines = s.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "3, 1, 20, 0, 2");
    }
}
