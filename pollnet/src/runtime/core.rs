use super::executor::Executor;
use super::task::{JoinHandle, Task};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

/// A multi-threaded task runtime.
///
/// `Runtime` is responsible for:
/// - spawning asynchronous tasks onto its worker threads,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// Sockets are not tied to a runtime: any task on any runtime may use
/// any socket. Dropping the runtime stops its workers; tasks that have
/// not completed are abandoned.
pub struct Runtime {
    executor: Executor,
}

impl Runtime {
    pub(crate) fn new(worker_threads: usize, thread_name: &str) -> Self {
        Self {
            executor: Executor::new(worker_threads, thread_name),
        }
    }

    /// Spawns a future onto the runtime and returns a handle to its
    /// result.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn(future, self.executor.scheduler().clone())
    }

    /// Runs a future to completion on the runtime, blocking the current
    /// thread until it finishes.
    ///
    /// Must not be called from a worker thread of the same runtime.
    ///
    /// # Panics
    ///
    /// Re-raises the panic of `future`, if it panicked.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut handle = self.spawn(future);

        let waker = Waker::from(Arc::new(Unpark(thread::current())));
        let mut cx = Context::from_waker(&waker);

        loop {
            match Pin::new(&mut handle).poll(&mut cx) {
                Poll::Ready(output) => return output,
                Poll::Pending => thread::park(),
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.executor.shutdown();
        self.executor.join();
    }
}

/// Wakes the thread blocked in [`Runtime::block_on`].
struct Unpark(Thread);

impl Wake for Unpark {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}
