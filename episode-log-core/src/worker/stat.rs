use std::time::Duration;

/// Stats of a [`RefreshWorker`](crate::RefreshWorker).
#[derive(Clone, Debug, Default)]
pub struct RefreshWorkerStat {
    /// The number of committed refreshes.
    pub n_refreshes: usize,

    /// The number of failed refreshes.
    pub n_failures: usize,

    /// Duration of the refresh loop.
    pub duration: Duration,
}

impl RefreshWorkerStat {
    /// Returns a formatted string.
    pub fn fmt(&self) -> String {
        let mut s = "refreshes, failures, duration [sec]\n".to_string();
        s += format!(
            "{}, {}, {}\n",
            self.n_refreshes,
            self.n_failures,
            self.duration.as_secs_f32()
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
        let stat = RefreshWorkerStat {
            n_refreshes: 12,
            n_failures: 1,
            duration: Duration::from_millis(1500),
        };
        assert_eq!(stat.fmt(), "refreshes, failures, duration [sec]\n12, 1, 1.5\n");
    }
}
