//! Timer and task scheduling
//!
//! The coordinator and the sync queue never call `tokio::spawn` directly.
//! They go through a [`Scheduler`] so that hosts (and tests) decide when
//! the 2s poll, the 30s heartbeat and the periodic sync actually run.

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Body of a repeating timer; called once per tick
pub type RepeatingTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs one-shot tasks and repeating timers
pub trait Scheduler: Send + Sync {
    /// Run `task` in the background as soon as possible.
    fn spawn(&self, name: &'static str, task: BoxFuture<'static, ()>);

    /// Run `task` every `period`, first tick one period from now.
    fn every(&self, name: &'static str, period: Duration, task: RepeatingTask) -> TimerHandle;
}

/// Handle to a repeating timer. Dropping it stops the timer.
pub struct TimerHandle {
    name: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(name: &'static str, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the timer. A tick already running is allowed to finish.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
            tracing::debug!(timer = self.name, "Timer cancelled");
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("name", &self.name)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Scheduler backed by the ambient tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn spawn(&self, name: &'static str, task: BoxFuture<'static, ()>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => tracing::warn!(task = name, "No tokio runtime, task dropped"),
        }
    }

    fn every(&self, name: &'static str, period: Duration, task: RepeatingTask) -> TimerHandle {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let start = tokio::time::Instant::now() + period;
                    let mut ticker = tokio::time::interval_at(start, period);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                    loop {
                        ticker.tick().await;
                        if flag.load(Ordering::Acquire) {
                            break;
                        }
                        task().await;
                    }
                    tracing::trace!(timer = name, "Timer loop exited");
                });
            }
            Err(_) => tracing::warn!(timer = name, "No tokio runtime, timer not started"),
        }

        TimerHandle::new(name, move || stopped.store(true, Ordering::Release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_ticks_until_cancelled() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let task: RepeatingTask = Arc::new(move || -> BoxFuture<'static, ()> {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handle = TokioScheduler.every("test", Duration::from_secs(2), task);

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handle_runs_cancel_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = TimerHandle::new("once", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(handle.name(), "once");
        handle.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
