//! Episode record, the unit of storage and sampling.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// The last timestamp handed out by [`next_timestamp()`] in this process.
static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

/// Returns the current wall-clock time in milliseconds.
///
/// Values returned in the same process are strictly increasing: when two calls fall
/// in the same millisecond, the later one is bumped to `last + 1`. This keeps
/// timestamps usable as a primary key of the durable store.
pub fn next_timestamp() -> u64 {
    let now = Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let ts = now.max(last + 1);
        match LAST_TIMESTAMP.compare_exchange_weak(last, ts, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return ts,
            Err(actual) => last = actual,
        }
    }
}

/// A piece of game-episode telemetry.
///
/// Records are immutable once built. The `with_*` methods consume the record and are
/// meant to be chained right after [`Record::new()`].
///
/// `priority` and `reward` are stored and returned as they are; sampling is uniform
/// and does not look at them.
///
/// ```rust
/// use episode_log_core::Record;
///
/// let record = Record::new(7, "worker-0", "{\"moves\": [1, 2, 3]}")
///     .with_seq(3)
///     .with_reward(1.0);
/// assert_eq!(record.timestamp(), 0);
/// assert_eq!(record.game_id(), 7);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    timestamp: u64,
    game_id: u64,
    seq: i32,
    priority: f32,
    reward: f32,
    machine: String,
    content: String,
}

impl Record {
    /// Creates a record with timestamp `0`, which is replaced with the wall-clock time
    /// when the record is appended.
    pub fn new(game_id: u64, machine: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            game_id,
            seq: 0,
            priority: 0.0,
            reward: 0.0,
            machine: machine.into(),
            content: content.into(),
        }
    }

    /// Sets the timestamp in milliseconds.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the sequence number within the game.
    pub fn with_seq(mut self, seq: i32) -> Self {
        self.seq = seq;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the reward.
    pub fn with_reward(mut self, reward: f32) -> Self {
        self.reward = reward;
        self
    }

    /// Returns the record with a timestamp assigned by [`next_timestamp()`] if it has none.
    pub fn stamped(self) -> Self {
        if self.timestamp == 0 {
            self.with_timestamp(next_timestamp())
        } else {
            self
        }
    }

    /// Timestamp in milliseconds, `0` if not assigned yet.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Identifier of the game the record belongs to.
    pub fn game_id(&self) -> u64 {
        self.game_id
    }

    /// Sequence number within the game.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    /// Priority.
    pub fn priority(&self) -> f32 {
        self.priority
    }

    /// Reward.
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Name of the machine that produced the record.
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Opaque payload.
    pub fn content(&self) -> &str {
        &self.content
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_next_timestamp_is_strictly_increasing() {
        let ts = (0..1000).map(|_| next_timestamp()).collect::<Vec<_>>();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_stamped_keeps_given_timestamp() {
        let record = Record::new(1, "m", "c").with_timestamp(100).stamped();
        assert_eq!(record.timestamp(), 100);

        let record = Record::new(1, "m", "c").stamped();
        assert!(record.timestamp() > 0);
    }

    #[test]
    fn test_serde_record() -> anyhow::Result<()> {
        let record = Record::new(3, "machine", "content")
            .with_timestamp(42)
            .with_seq(-1)
            .with_priority(0.5)
            .with_reward(2.0);
        let yaml = serde_yaml::to_string(&record)?;
        let record_: Record = serde_yaml::from_str(&yaml)?;
        assert_eq!(record, record_);
        Ok(())
    }
}
