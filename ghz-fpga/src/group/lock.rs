use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use ghz_fpga_core::defined::PERFORMANCE_HISTORY_LEN;
use tokio::sync::{Mutex, MutexGuard};

/// The most recent wait times of a pipeline stage.
#[derive(Debug, Default)]
pub(crate) struct WaitHistory(Mutex<VecDeque<Duration>>);

impl WaitHistory {
    pub async fn record(&self, wait: Duration) {
        let mut history = self.0.lock().await;
        if history.len() == PERFORMANCE_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(wait);
    }

    pub async fn snapshot(&self) -> Vec<Duration> {
        self.0.lock().await.iter().copied().collect()
    }
}

/// A mutex that records how long each acquisition waited.
#[derive(Debug)]
pub(crate) struct TimedMutex<T> {
    inner: Mutex<T>,
    waits: WaitHistory,
}

impl<T> TimedMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            waits: WaitHistory::default(),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, T> {
        let start = Instant::now();
        let guard = self.inner.lock().await;
        self.waits.record(start.elapsed()).await;
        guard
    }

    pub async fn waits(&self) -> Vec<Duration> {
        self.waits.snapshot().await
    }
}

/// Wait times of the pipeline locks of a board group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerformanceData {
    /// Wait times of every page lock.
    pub page: Vec<Vec<Duration>>,
    /// Wait times of the run lock.
    pub run: Vec<Duration>,
    /// Time run packets waited for the triggers of the previous run.
    pub run_trigger: Vec<Duration>,
    /// Wait times of the read lock.
    pub read: Vec<Duration>,
}
