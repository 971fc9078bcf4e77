// Cancellable background tasks owned by one engine session.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct Tasks {
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Tracks delayed work (confirmatory polls, connectivity resets) and in-flight
/// toggle tasks so that shutdown can abort all of them at once.
#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Mutex<Tasks>,
}

impl Scheduler {
    /// Spawns `task` right away. Returns false once the scheduler is closed,
    /// in which case `task` is dropped without running.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        if tasks.closed {
            return false;
        }
        tasks.handles.retain(|handle| !handle.is_finished());
        tasks.handles.push(tokio::spawn(task));
        true
    }

    /// Runs `task` after `delay`.
    pub fn spawn_after<F>(&self, label: &'static str, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = label, delay_ms = delay.as_millis() as u64, "scheduling");
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        })
    }

    /// Number of tracked tasks that have not completed yet.
    pub fn pending(&self) -> usize {
        self.lock()
            .handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Aborts everything and refuses new work. Safe to call repeatedly.
    pub fn cancel_all(&self) {
        let mut tasks = self.lock();
        tasks.closed = true;
        for handle in tasks.handles.drain(..) {
            handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tasks> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn delayed_task_runs_after_delay() {
        let scheduler = Scheduler::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        scheduler.spawn_after("test", Duration::from_secs(2), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_aborts_pending_and_rejects_new_work() {
        let scheduler = Scheduler::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        scheduler.spawn_after("test", Duration::from_secs(3), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(scheduler.pending(), 1);

        scheduler.cancel_all();
        assert!(!scheduler.spawn(async {}));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }
}
