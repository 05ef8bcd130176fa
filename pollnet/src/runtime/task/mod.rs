//! Asynchronous task primitives.
//!
//! Most users interact with this module through [`spawn`] and the
//! [`JoinHandle`] it returns.

mod core;
mod handle;
mod state;

pub(crate) use self::core::{Runnable, Task};

pub use self::core::spawn;
pub use handle::JoinHandle;
