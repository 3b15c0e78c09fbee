//! Single-slot deferred task.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Runs at most one armed task after a quiet period.
///
/// [`schedule`](Self::schedule) replaces whatever is armed, restarting the
/// wait. Once the delay elapses the task is detached onto its own tokio task,
/// so [`cancel`](Self::cancel) never aborts work that has already started.
/// Dropping the debouncer cancels the armed task.
#[derive(Debug, Default)]
pub struct Debouncer {
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm `task` to run after `delay`, cancelling any armed task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(task);
        });

        if let Some(previous) = self.slot().replace(timer) {
            previous.abort();
        }
    }

    /// Disarm the pending task. Returns `true` if one was still waiting.
    pub fn cancel(&self) -> bool {
        self.slot().take().is_some_and(|timer| {
            let waiting = !timer.is_finished();
            timer.abort();
            waiting
        })
    }

    /// Whether a task is armed and still waiting.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot().as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter_task(counter: Arc<AtomicUsize>, value: usize) -> impl Future<Output = ()> {
        async move {
            counter.store(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_runs_only_last_task() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(Duration::from_millis(500), counter_task(Arc::clone(&fired), 1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.schedule(Duration::from_millis(500), counter_task(Arc::clone(&fired), 2));

        // First deadline (t=500) passes without firing.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_armed());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(Duration::from_millis(500), counter_task(Arc::clone(&fired), 1));
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_does_not_abort_task() {
        let debouncer = Debouncer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        debouncer.schedule(Duration::from_millis(100), async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            counter.store(9, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!debouncer.cancel());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 9);
    }
}
