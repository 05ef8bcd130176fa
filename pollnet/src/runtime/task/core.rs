use super::JoinHandle;
use super::state::{COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::runtime::context;
use crate::runtime::scheduler::Scheduler;

use std::cell::UnsafeCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;

/// A unit of work the scheduler can run without knowing its output type.
pub(crate) trait Runnable: Send + Sync {
    /// Polls the task once. Called by a worker thread.
    fn run(self: Arc<Self>);
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A spawned task.
///
/// Owns the future until it completes, then the result (or the panic
/// payload) until the join handle takes it.
pub(crate) struct Task<T> {
    /// The future, dropped as soon as it completes.
    future: UnsafeCell<Option<BoxFuture<T>>>,

    /// Output of the future, or its panic payload.
    result: UnsafeCell<Option<thread::Result<T>>>,

    /// Lifecycle state, see [`state`](super::state).
    state: AtomicUsize,

    /// Run queue the task is pushed to when woken.
    scheduler: Arc<Scheduler>,

    /// Waker of the task awaiting the join handle.
    waiter: Mutex<Option<Waker>>,
}

// SAFETY: `future` is only touched while the task is RUNNING, which one
// worker at a time can observe; `result` is written before COMPLETED is
// published and read only by the single join handle after it.
unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send> Sync for Task<T> {}

impl<T: Send + 'static> Task<T> {
    /// Creates a task and queues it on `scheduler`.
    pub(crate) fn spawn<F>(future: F, scheduler: Arc<Scheduler>) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let task = Arc::new(Task {
            future: UnsafeCell::new(Some(Box::pin(future))),
            result: UnsafeCell::new(None),
            state: AtomicUsize::new(QUEUED),
            scheduler: scheduler.clone(),
            waiter: Mutex::new(None),
        });

        scheduler.push(task.clone());

        JoinHandle::new(task)
    }

    fn poll_once(self: Arc<Self>) {
        if self
            .state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: RUNNING grants exclusive access to the future.
            match unsafe { &mut *self.future.get() } {
                Some(future) => future.as_mut().poll(&mut cx),
                None => Poll::Pending,
            }
        }));

        let result = match outcome {
            Ok(Poll::Pending) => {
                // Woken while running: go straight back to the queue.
                if self
                    .state
                    .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    self.state.store(QUEUED, Ordering::Release);
                    self.scheduler.push(self.clone());
                }
                return;
            }
            Ok(Poll::Ready(output)) => Ok(output),
            Err(payload) => {
                log::error!("task panicked");
                Err(payload)
            }
        };

        // SAFETY: still RUNNING; nothing else reads either cell yet.
        unsafe {
            *self.future.get() = None;
            *self.result.get() = Some(result);
        }

        self.state.store(COMPLETED, Ordering::Release);

        let waiter = self
            .waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Reschedules the task.
    ///
    /// An idle task is queued; a running task is marked so that it is
    /// queued again as soon as its current poll returns.
    fn schedule(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.scheduler.push(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }

    /// Takes the result if the task completed.
    ///
    /// # Panics
    ///
    /// Panics if the result was already taken.
    pub(crate) fn take_result(&self) -> Option<thread::Result<T>> {
        if !self.is_complete() {
            return None;
        }

        // SAFETY: COMPLETED was published after the write, and the join
        // handle is the only reader.
        let result = unsafe { (*self.result.get()).take() };

        Some(result.expect("JoinHandle polled after completion"))
    }

    pub(crate) fn set_waiter(&self, waker: &Waker) {
        let mut waiter = self.waiter.lock().unwrap_or_else(PoisonError::into_inner);

        match &*waiter {
            Some(w) if w.will_wake(waker) => {}
            _ => *waiter = Some(waker.clone()),
        }
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        self.poll_once();
    }
}

impl<T: Send + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }
}

/// Spawns a future as a task onto the current runtime.
///
/// # Panics
///
/// Panics if called outside of a runtime worker thread.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let scheduler =
        context::current().expect("spawn must be called within the context of a runtime");

    Task::spawn(future, scheduler)
}
