//! Error values surfaced by sockets and the poll server.
//!
//! Every fallible operation in this crate returns [`std::io::Result`].
//! The kinds callers are expected to match on are:
//!
//! - [`io::ErrorKind::TimedOut`]: a read, write, accept or connect
//!   deadline expired,
//! - [`io::ErrorKind::InvalidInput`]: the socket was already closed,
//! - [`io::ErrorKind::Other`] wrapping a [`PollServerError`]: the poll
//!   server is gone and no wait can be serviced any more.
//!
//! All other errors are passed through from the operating system.

use std::io;

/// Failure of the poll server itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollServerError {
    /// The poller's blocking wait failed and the server loop stopped.
    #[error("poll server stopped after poller failure: {message}")]
    PollerFailed {
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
        /// Rendered message of the underlying I/O error.
        message: String,
    },

    /// The server loop is no longer accepting requests.
    #[error("poll server is not running")]
    Stopped,

    /// A global poll server was already installed.
    #[error("a global poll server is already running")]
    AlreadyStarted,
}

impl PollServerError {
    pub(crate) fn poller_failed(err: &io::Error) -> Self {
        PollServerError::PollerFailed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Extracts a `PollServerError` carried inside an [`io::Error`].
    pub fn from_io(err: &io::Error) -> Option<&PollServerError> {
        err.get_ref()?.downcast_ref::<PollServerError>()
    }
}

impl From<PollServerError> for io::Error {
    fn from(err: PollServerError) -> Self {
        io::Error::other(err)
    }
}

/// Returns `true` if the error reports an expired deadline.
pub fn is_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
}

pub(crate) fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded")
}

pub(crate) fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "socket is closed")
}
