//! Scheduler for deterministic tests
//!
//! Nothing runs on its own: repeating timers are recorded and fire only
//! through [`ManualScheduler::fire`], and spawned tasks wait in a list until
//! [`ManualScheduler::run_spawned`] drives them.

use futures_util::future::BoxFuture;
use grant_common::{RepeatingTask, Scheduler, TimerHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Timer {
    id: u64,
    period: Duration,
    task: RepeatingTask,
}

#[derive(Default)]
struct Inner {
    timers: HashMap<&'static str, Timer>,
    spawned: Vec<(&'static str, BoxFuture<'static, ()>)>,
}

#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<Inner>>,
    next_id: Arc<AtomicU64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one tick of the named timer. Returns `false` if it is not active.
    pub async fn fire(&self, name: &str) -> bool {
        let task = {
            let inner = self.inner.lock().unwrap();
            inner.timers.get(name).map(|timer| Arc::clone(&timer.task))
        };
        match task {
            Some(task) => {
                task().await;
                true
            }
            None => false,
        }
    }

    /// Await every spawned task, including ones spawned while draining.
    /// Returns how many ran.
    pub async fn run_spawned(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut self.inner.lock().unwrap().spawned);
            if batch.is_empty() {
                return ran;
            }
            for (_, task) in batch {
                task.await;
                ran += 1;
            }
        }
    }

    /// Names of tasks waiting to run
    pub fn spawned_names(&self) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap()
            .spawned
            .iter()
            .map(|(name, _)| *name)
            .collect()
    }

    /// Drop queued tasks without running them
    pub fn discard_spawned(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.spawned.len();
        inner.spawned.clear();
        count
    }

    /// Names of active timers, sorted
    pub fn active_timers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.inner.lock().unwrap().timers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn period_of(&self, name: &str) -> Option<Duration> {
        self.inner.lock().unwrap().timers.get(name).map(|t| t.period)
    }
}

impl Scheduler for ManualScheduler {
    fn spawn(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        self.inner.lock().unwrap().spawned.push((name, task));
    }

    fn every(&self, name: &'static str, period: Duration, task: RepeatingTask) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .lock()
            .unwrap()
            .timers
            .insert(name, Timer { id, period, task });

        let inner = Arc::clone(&self.inner);
        TimerHandle::new(name, move || {
            let mut inner = inner.lock().unwrap();
            // A later registration under the same name keeps running
            if inner.timers.get(name).map(|t| t.id) == Some(id) {
                inner.timers.remove(name);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(counter: &Arc<AtomicUsize>) -> RepeatingTask {
        let counter = Arc::clone(counter);
        Arc::new(move || -> BoxFuture<'static, ()> {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_fire_and_cancel() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.every("poll", Duration::from_secs(2), counting_task(&hits));
        assert_eq!(scheduler.active_timers(), vec!["poll"]);
        assert_eq!(scheduler.period_of("poll"), Some(Duration::from_secs(2)));

        assert!(scheduler.fire("poll").await);
        assert!(scheduler.fire("poll").await);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        handle.cancel();
        assert!(!scheduler.fire("poll").await);
        assert!(scheduler.active_timers().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_tasks_wait() {
        let scheduler = ManualScheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        scheduler.spawn(
            "sync",
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.spawned_names(), vec!["sync"]);

        assert_eq!(scheduler.run_spawned().await, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.run_spawned().await, 0);
    }
}
