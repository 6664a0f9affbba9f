//! Supervision of long-running asynchronous units.
//!
//! # Responsibilities
//! - Spawn named units (accept loop, per-connection handling, relays)
//! - Count running units for drain and monitoring
//! - Mark a unit finished however it ends: return, panic or abort

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::observability::metrics;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawns and counts supervised tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskSupervisor {
    active: Arc<AtomicUsize>,
    spawned: Arc<AtomicU64>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` as a unit named `task`.
    pub fn spawn<F>(&self, task: &'static str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track(task);
        tokio::spawn(async move {
            let _guard = guard;
            future.await
        })
    }

    /// Record a running unit. Returns a guard that marks it finished on drop.
    pub fn track(&self, task: &'static str) -> TaskGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.spawned.fetch_add(1, Ordering::Relaxed);
        metrics::task_started(task);
        tracing::trace!(task, "Task started");
        TaskGuard {
            active: Arc::clone(&self.active),
            task,
        }
    }

    /// Units currently running.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Units spawned since startup.
    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Wait until no unit is running. Returns `false` if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.active_count() > 0 {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Marks a unit finished when dropped.
#[derive(Debug)]
pub struct TaskGuard {
    active: Arc<AtomicUsize>,
    task: &'static str,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::task_finished(self.task);
        tracing::trace!(task = self.task, "Task finished");
    }
}
