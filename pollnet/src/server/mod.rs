//! The poll server.
//!
//! A single background thread multiplexes the readiness waits of every
//! socket attached to it. Tasks never touch the poller directly: they
//! push a request onto a bounded queue and then write one byte to the
//! server's wakeup pipe, in that order, so the server can never sleep
//! through a request that was already enqueued.
//!
//! The process-wide instance is started lazily by [`PollServer::global`]
//! and lives for the rest of the process. Additional instances can be
//! built with [`PollServerBuilder`]; those stop once the last handle to
//! them, including every socket attached to them, is dropped.

mod builder;
mod core;
mod wakeup;

pub use builder::PollServerBuilder;

use crate::error::PollServerError;
use crate::poller::Direction;
use crate::socket::Inner;

use std::{fmt, io};
use std::os::fd::RawFd;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use wakeup::Wakeup;

static GLOBAL: OnceLock<PollServer> = OnceLock::new();

/// Serializes construction of the global instance so that a failed
/// attempt leaves nothing installed.
static INIT: Mutex<()> = Mutex::new(());

/// A message from a task to the server loop.
pub(crate) enum Request {
    /// Wake the socket's `direction` slot when the descriptor is ready or
    /// the deadline passes.
    Wait {
        socket: Arc<Inner>,
        direction: Direction,
    },

    /// The socket was closed; forget anything registered under `fd`.
    Evict { socket: Arc<Inner>, fd: RawFd },

    /// A deadline of a registered socket moved; recompute the nearest one.
    Reschedule,
}

/// Outcome of a non-blocking submission.
pub(crate) enum Submit {
    Queued,
    Full,
    Down(io::Error),
}

/// A handle to a running poll server.
///
/// Cheap to clone. Every [`Socket`](crate::Socket) keeps one.
#[derive(Clone)]
pub struct PollServer {
    shared: Arc<Shared>,
}

struct Shared {
    /// `None` only while the handle is being torn down.
    sender: Option<SyncSender<Request>>,

    wakeup: Arc<Wakeup>,

    status: Arc<OnceLock<PollServerError>>,
}

impl PollServer {
    /// Returns the process-wide poll server, starting it on first use.
    ///
    /// Creation happens exactly once even when many threads race here.
    /// If it fails, the error is returned to the caller and a later call
    /// tries again.
    pub fn global() -> io::Result<PollServer> {
        if let Some(server) = GLOBAL.get() {
            return Ok(server.clone());
        }

        install(PollServerBuilder::new(), false)
    }

    /// Returns a builder for a custom poll server.
    pub fn builder() -> PollServerBuilder {
        PollServerBuilder::new()
    }

    /// Returns `false` once the server loop has died.
    pub fn is_running(&self) -> bool {
        self.shared.status.get().is_none()
    }

    /// The error the server loop died of, if it did.
    pub fn failure(&self) -> Option<PollServerError> {
        self.shared.status.get().cloned()
    }

    /// Whether `self` and `other` are handles to the same server.
    pub fn same_server(&self, other: &PollServer) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Enqueues a wait request, then wakes the server loop.
    ///
    /// Never blocks: a full queue is reported so the caller can yield and
    /// retry once the server has made room.
    pub(crate) fn submit_wait(&self, socket: &Arc<Inner>, direction: Direction) -> Submit {
        let Some(sender) = &self.shared.sender else {
            return Submit::Down(self.down());
        };

        let request = Request::Wait {
            socket: Arc::clone(socket),
            direction,
        };

        match sender.try_send(request) {
            Ok(()) => {
                self.shared.wakeup.signal();
                Submit::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.shared.wakeup.signal();
                Submit::Full
            }
            Err(TrySendError::Disconnected(_)) => Submit::Down(self.down()),
        }
    }

    /// Asks the server to drop the registrations `socket` holds under
    /// `fd`, waking its waiters.
    ///
    /// Blocks while the request queue is full. Must not be called from
    /// the server thread.
    pub(crate) fn evict(&self, socket: &Arc<Inner>, fd: RawFd) {
        let request = Request::Evict {
            socket: Arc::clone(socket),
            fd,
        };

        self.send(request);
    }

    /// Asks the server to re-read the deadlines of every pending wait.
    ///
    /// Blocks while the request queue is full. Must not be called from
    /// the server thread.
    pub(crate) fn reschedule(&self) {
        self.send(Request::Reschedule);
    }

    fn send(&self, request: Request) {
        let Some(sender) = &self.shared.sender else {
            return;
        };

        // Make sure the loop is draining before a possibly blocking send.
        self.shared.wakeup.signal();

        if sender.send(request).is_ok() {
            self.shared.wakeup.signal();
        }
    }

    fn down(&self) -> io::Error {
        self.failure().unwrap_or(PollServerError::Stopped).into()
    }
}

impl fmt::Debug for PollServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollServer")
            .field("failure", &self.shared.status.get())
            .finish_non_exhaustive()
    }
}

impl Drop for Shared {
    /// Lets the server loop observe that the last handle is gone.
    fn drop(&mut self) {
        drop(self.sender.take());
        self.wakeup.signal();
    }
}

/// Starts the server described by `builder` as the global instance.
///
/// With `exclusive`, an existing global instance is an error instead of
/// being returned.
fn install(builder: PollServerBuilder, exclusive: bool) -> io::Result<PollServer> {
    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(server) = GLOBAL.get() {
        return if exclusive {
            Err(PollServerError::AlreadyStarted.into())
        } else {
            Ok(server.clone())
        };
    }

    let server = builder.spawn()?;
    let _ = GLOBAL.set(server.clone());

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Socket;
    use crate::poller::{self, Poller};
    use crate::runtime::builder::RuntimeBuilder;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Delegates to the platform poller until told to fail.
    struct FailingPoller {
        inner: Box<dyn Poller>,
        broken: Arc<AtomicBool>,
    }

    impl Poller for FailingPoller {
        fn register(&mut self, fd: RawFd, direction: Direction, persistent: bool) -> io::Result<()> {
            self.inner.register(fd, direction, persistent)
        }

        fn unregister(&mut self, fd: RawFd, direction: Direction) {
            self.inner.unregister(fd, direction)
        }

        fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Option<(RawFd, Direction)>> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::Error::from_raw_os_error(libc::EBADF));
            }

            let timeout = Some(timeout.map_or(Duration::from_millis(10), |t| {
                t.min(Duration::from_millis(10))
            }));

            self.inner.wait(timeout)
        }
    }

    fn failing_server() -> (PollServer, Arc<AtomicBool>) {
        let broken = Arc::new(AtomicBool::new(false));
        let poller = FailingPoller {
            inner: poller::platform(16).unwrap(),
            broken: broken.clone(),
        };

        let server = PollServer::builder()
            .thread_name("pollnet-failing-server")
            .poller(poller)
            .spawn()
            .unwrap();

        (server, broken)
    }

    #[test]
    fn poller_failure_releases_waiters_and_rejects_new_ones() {
        let _ = env_logger::builder().is_test(true).try_init();

        let (server, broken) = failing_server();
        let (a, _b) = Socket::pair_on(&server).unwrap();
        let (c, _d) = Socket::pair_on(&server).unwrap();

        let runtime = RuntimeBuilder::new().worker_threads(2).build();

        let err = runtime.block_on(async move {
            let reader = crate::task::spawn(async move {
                let mut buf = [0u8; 8];
                a.read(&mut buf).await
            });

            std::thread::sleep(Duration::from_millis(50));
            broken.store(true, Ordering::SeqCst);

            reader.await.unwrap_err()
        });

        let failure = PollServerError::from_io(&err).cloned();
        assert!(matches!(failure, Some(PollServerError::PollerFailed { .. })));
        assert!(!server.is_running());

        let err = runtime.block_on(async move {
            let mut buf = [0u8; 8];
            c.read(&mut buf).await.unwrap_err()
        });

        assert!(matches!(
            PollServerError::from_io(&err),
            Some(PollServerError::PollerFailed { .. } | PollServerError::Stopped)
        ));
    }

    #[test]
    fn dropping_every_handle_stops_a_private_server() {
        let server = PollServer::builder().spawn().unwrap();
        let (a, b) = Socket::pair_on(&server).unwrap();

        assert!(server.is_running());

        drop(a);
        drop(b);
        drop(server);
    }

    #[test]
    fn global_is_a_singleton() {
        let first = PollServer::global().unwrap();
        let second = PollServer::global().unwrap();

        assert!(first.same_server(&second));

        let err = PollServer::builder().install().unwrap_err();
        assert_eq!(
            PollServerError::from_io(&err),
            Some(&PollServerError::AlreadyStarted)
        );
    }
}
