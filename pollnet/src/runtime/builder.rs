use super::Runtime;

use std::num::NonZeroUsize;
use std::thread;

/// Configures the task runtime that drives socket futures.
///
/// The runtime and the poll server are independent: sockets talk to
/// their poll server whichever runtime polls them, so the worker count
/// only bounds how many tasks make progress at once.
///
/// # Examples
///
/// ```rust,ignore
/// let runtime = RuntimeBuilder::new()
///     .worker_threads(2)
///     .thread_name("echo-worker")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    workers: NonZeroUsize,

    /// Workers are named `{thread_name}-{index}`.
    thread_name: String,
}

impl RuntimeBuilder {
    /// One worker per available CPU, or a single worker when the CPU
    /// count is unknown, named `pollnet-worker-{index}`.
    pub fn new() -> Self {
        Self {
            workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            thread_name: "pollnet-worker".to_owned(),
        }
    }

    /// Sets how many tasks may be polled in parallel.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        let Some(workers) = NonZeroUsize::new(n) else {
            panic!("worker_threads must be > 0");
        };

        self.workers = workers;
        self
    }

    /// Sets the prefix of the worker thread names.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Spawns the workers. A worker that fails to start is logged and
    /// skipped.
    pub fn build(self) -> Runtime {
        Runtime::new(self.workers.get(), &self.thread_name)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
