//! The task runtime.
//!
//! A small multi-threaded executor hosting the tasks that use sockets.
//! Tasks suspended on a socket release their worker thread; the poll
//! server wakes them through their [`Waker`](std::task::Waker) once the
//! socket is ready.
//!
//! It is composed of:
//! - [`builder`]: runtime configuration,
//! - [`scheduler`]: the shared run queue workers sleep on,
//! - [`task`]: the task state machine, join handles and `spawn`.

mod context;
mod core;
mod executor;
mod scheduler;

pub(crate) mod builder;

pub mod task;

pub use self::core::Runtime;
