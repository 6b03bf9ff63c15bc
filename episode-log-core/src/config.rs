//! Configuration of [`EpisodeLog`](crate::EpisodeLog).
use crate::{EpisodeLogError, SamplingMode};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    time::Duration,
};

/// Configuration of [`EpisodeLog`](crate::EpisodeLog).
///
/// Fixed once the log is built.
///
/// # Examples
///
/// ```rust
/// use episode_log_core::{EpisodeLogConfig, SamplingMode};
///
/// let config = EpisodeLogConfig::default()
///     .path("/data/selfplay.db")
///     .table_name("selfplay")
///     .window(5000)
///     .sampling_mode(SamplingMode::Pinned);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpisodeLogConfig {
    /// Location of the durable store, e.g., the path of a database file.
    pub path: String,

    /// Name of the table holding the records.
    pub table_name: String,

    /// The number of records loaded by a refresh.
    pub window: usize,

    /// Interval of refreshes run by [`RefreshWorker`](crate::RefreshWorker), in milliseconds.
    pub refresh_interval_ms: u64,

    /// Sampling mode of the samplers created by [`EpisodeLog::sampler()`](crate::EpisodeLog::sampler).
    #[serde(default)]
    pub sampling_mode: SamplingMode,

    /// If `true`, stores log every statement they run.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EpisodeLogConfig {
    fn default() -> Self {
        Self {
            path: "episodes.db".to_string(),
            table_name: "episodes".to_string(),
            window: 1000,
            refresh_interval_ms: 1000,
            sampling_mode: SamplingMode::Latest,
            verbose: false,
        }
    }
}

impl EpisodeLogConfig {
    /// Sets the location of the durable store.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the table name.
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the number of records loaded by a refresh.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Sets the refresh interval in milliseconds.
    pub fn refresh_interval_ms(mut self, refresh_interval_ms: u64) -> Self {
        self.refresh_interval_ms = refresh_interval_ms;
        self
    }

    /// Sets the sampling mode.
    pub fn sampling_mode(mut self, sampling_mode: SamplingMode) -> Self {
        self.sampling_mode = sampling_mode;
        self
    }

    /// Turns statement logging on or off.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Checks the values.
    pub fn validate(&self) -> Result<(), EpisodeLogError> {
        if self.window == 0 {
            return Err(EpisodeLogError::InvalidConfig(
                "window must be positive".to_string(),
            ));
        }
        if self.refresh_interval_ms == 0 {
            return Err(EpisodeLogError::InvalidConfig(
                "refresh_interval_ms must be positive".to_string(),
            ));
        }
        if self.path.is_empty() {
            return Err(EpisodeLogError::InvalidConfig(
                "path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Constructs [`EpisodeLogConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EpisodeLogConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
