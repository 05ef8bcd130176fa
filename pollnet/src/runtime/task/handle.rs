use super::Task;

use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// Resolves to the task's output once it completes. If the task
/// panicked, awaiting the handle re-raises the panic.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    task: Arc<Task<T>>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub(crate) fn new(task: Arc<Task<T>>) -> Self {
        Self { task }
    }

    /// Returns `true` once the task has completed.
    pub fn is_finished(&self) -> bool {
        self.task.is_complete()
    }
}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = T;

    /// The waker is registered before re-checking the task state so that
    /// a completion in between is not missed.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if let Some(result) = self.task.take_result() {
            return Poll::Ready(unwind(result));
        }

        self.task.set_waiter(cx.waker());

        match self.task.take_result() {
            Some(result) => Poll::Ready(unwind(result)),
            None => Poll::Pending,
        }
    }
}

fn unwind<T>(result: std::thread::Result<T>) -> T {
    match result {
        Ok(output) => output,
        Err(payload) => panic::resume_unwind(payload),
    }
}
