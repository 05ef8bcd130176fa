use super::task::Runnable;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Run queue shared by every worker of a runtime.
///
/// Woken tasks are pushed at the back and taken from the front. Idle
/// workers sleep on a condition variable until a task arrives or the
/// runtime shuts down.
pub(crate) struct Scheduler {
    /// Tasks ready to be polled.
    queue: Mutex<VecDeque<Arc<dyn Runnable>>>,

    /// Signalled on push and on shutdown.
    available: Condvar,

    /// Set once the runtime is dropped.
    shutdown: AtomicBool,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Queues a task. Tasks pushed after shutdown are dropped.
    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);

        self.available.notify_one();
    }

    /// Blocks until a task is available. Returns `None` on shutdown.
    pub(crate) fn next(&self) -> Option<Arc<dyn Runnable>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }

            if let Some(task) = queue.pop_front() {
                return Some(task);
            }

            queue = self
                .available
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stops every worker and drops the queued tasks.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let drained: Vec<_> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        self.available.notify_all();
        drop(drained);
    }
}
