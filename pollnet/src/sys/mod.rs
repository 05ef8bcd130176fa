//! Thin wrappers over the Unix system calls used by sockets and the
//! poll server.
//!
//! Everything here works on raw descriptors and reports failures as
//! [`std::io::Error`] built from `errno`.

mod fork;

pub(crate) mod unix;

pub use fork::fork_lock;

pub(crate) use fork::read as fork_read;
pub(crate) use unix as platform;
