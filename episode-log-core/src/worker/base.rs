use super::RefreshWorkerStat;
use crate::{DurableStore, EpisodeLog};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Refreshes the cache of an [`EpisodeLog`] periodically on a background thread.
///
/// Failed refreshes are logged and counted; the loop goes on with the previous
/// buffer active. The thread is stopped by [`RefreshWorker::stop_and_join()`] or when
/// the worker is dropped.
pub struct RefreshWorker {
    stop: Sender<()>,
    handle: Option<JoinHandle<RefreshWorkerStat>>,
}

impl RefreshWorker {
    /// Spawns a thread refreshing `log` every `interval`.
    pub fn spawn<S>(log: Arc<EpisodeLog<S>>, interval: Duration) -> Self
    where
        S: DurableStore + 'static,
    {
        let (stop, stop_receiver) = bounded(1);
        let handle = thread::spawn(move || Self::run_loop(log, interval, stop_receiver));
        info!("Starts refresh worker, interval {:?}", interval);
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Spawns a thread refreshing `log` at the interval of its configuration.
    pub fn spawn_with_config<S>(log: Arc<EpisodeLog<S>>) -> Self
    where
        S: DurableStore + 'static,
    {
        let interval = log.config().refresh_interval();
        Self::spawn(log, interval)
    }

    /// Stops the thread and returns its stats.
    pub fn stop_and_join(mut self) -> Result<RefreshWorkerStat> {
        self.stop_inner()
            .ok_or_else(|| anyhow!("refresh worker was already stopped"))?
    }

    fn stop_inner(&mut self) -> Option<Result<RefreshWorkerStat>> {
        let handle = self.handle.take()?;
        // Fails only if the thread is gone already
        let _ = self.stop.try_send(());
        Some(
            handle
                .join()
                .map_err(|_| anyhow!("refresh worker thread panicked")),
        )
    }

    fn run_loop<S: DurableStore>(
        log: Arc<EpisodeLog<S>>,
        interval: Duration,
        stop: Receiver<()>,
    ) -> RefreshWorkerStat {
        let start = Instant::now();
        let mut stat = RefreshWorkerStat::default();

        loop {
            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            match log.refresh() {
                Ok(_) => stat.n_refreshes += 1,
                Err(e) => {
                    stat.n_failures += 1;
                    warn!("Refresh worker keeps the previous buffer: {:#}", e);
                }
            }
        }

        stat.duration = start.elapsed();
        info!("Stopped refresh worker\n{}", stat.fmt());
        stat
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.stop_inner() {
            warn!("{:#}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{EpisodeLogConfig, MemoryStore, Record};
    use test_log::test;

    #[test]
    fn test_refresh_worker_makes_appends_visible() -> Result<()> {
        let log = Arc::new(EpisodeLog::new(
            MemoryStore::new(),
            EpisodeLogConfig::default().window(10).refresh_interval_ms(5),
        )?);
        let worker = RefreshWorker::spawn_with_config(log.clone());

        log.append(Record::new(1, "m", ""))?;
        let deadline = Instant::now() + Duration::from_secs(5);
        while log.cache().active().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(log.cache().active().len(), 1);

        let stat = worker.stop_and_join()?;
        assert!(stat.n_refreshes >= 1);
        assert_eq!(stat.n_failures, 0);
        Ok(())
    }

    #[test]
    fn test_drop_stops_worker() -> Result<()> {
        let log = Arc::new(EpisodeLog::new(
            MemoryStore::new(),
            EpisodeLogConfig::default(),
        )?);
        {
            let _worker = RefreshWorker::spawn(log.clone(), Duration::from_secs(60));
        }
        // The worker thread released its handle on the log
        assert_eq!(Arc::strong_count(&log), 1);
        Ok(())
    }
}
