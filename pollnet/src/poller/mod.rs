//! Platform-specific readiness pollers.
//!
//! The poll server drives exactly one [`Poller`]. A poller tracks, per
//! descriptor, whether the server wants to hear about readability,
//! writability or both, and hands back one ready `(fd, direction)` pair
//! per call to [`Poller::wait`].
//!
//! Registrations are one-shot unless marked persistent: once a direction
//! fires it is disarmed and must be registered again. Only the poll
//! server's own wakeup pipe is registered persistently.
//!
//! The concrete backend is selected at compile time:
//! - Linux and Android use `epoll`,
//! - every other Unix uses `poll(2)`.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod poll;

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) type PlatformPoller = epoll::EpollPoller;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) type PlatformPoller = poll::PollPoller;

/// The direction of an I/O readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Waiting for the descriptor to become readable (or acceptable).
    Read,

    /// Waiting for the descriptor to become writable (or connected).
    Write,
}

impl Direction {
    /// Both directions, read first.
    pub const ALL: [Direction; 2] = [Direction::Read, Direction::Write];
}

/// An OS readiness primitive.
///
/// Implementations are owned and driven by the poll server thread only,
/// so they need to be `Send` but not `Sync`.
pub trait Poller: Send {
    /// Starts watching `fd` for readiness in `direction`.
    ///
    /// A non-persistent registration fires at most once. Registering a
    /// direction that is already armed is not an error.
    fn register(&mut self, fd: RawFd, direction: Direction, persistent: bool) -> io::Result<()>;

    /// Stops watching `fd` in `direction`.
    ///
    /// Unregistering something that is not registered is a no-op.
    fn unregister(&mut self, fd: RawFd, direction: Direction);

    /// Blocks until a registered direction is ready or `timeout` elapses.
    ///
    /// `None` as timeout blocks indefinitely. Returns `Ok(None)` when the
    /// wait ended without a ready descriptor (timeout or interruption).
    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Option<(RawFd, Direction)>>;
}

/// Creates the poller for the current platform.
///
/// `capacity` bounds how many kernel events are collected per system call.
pub(crate) fn platform(capacity: usize) -> io::Result<Box<dyn Poller>> {
    Ok(Box::new(PlatformPoller::new(capacity)?))
}

/// Converts an optional timeout to milliseconds for `epoll_wait`/`poll`.
///
/// Rounds up so that a sub-millisecond remainder never turns into a busy
/// zero-timeout spin.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_nanos().div_ceil(1_000_000);
            i32::try_from(ms).unwrap_or(i32::MAX)
        }
    }
}
