//! The socket handle.
//!
//! A [`Socket`] owns one non-blocking descriptor and offers reads,
//! writes and accepts that look blocking to the calling task: when the
//! kernel reports that the operation would block, the task asks the poll
//! server to watch the descriptor and suspends until it is woken.
//!
//! Each direction has its own lock, deadline and wakeup slot, so one task
//! may read while another writes. Callers in the same direction are
//! served one at a time, in arrival order.

pub(crate) mod deadline;

mod half;
mod lock;
mod wait;

use crate::error;
use crate::poller::Direction;
use crate::server::PollServer;
use crate::sys::{fork_read, platform};

use half::Half;
use wait::WaitFuture;

use std::net::{Shutdown, SocketAddr};
use std::os::fd::{IntoRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};
use std::{fmt, io};

/// Descriptor value of a closed socket.
const CLOSED: RawFd = -1;

/// A non-blocking socket attached to a poll server.
///
/// Cloning produces another handle to the same socket. The descriptor is
/// closed by [`close`](Self::close) or when the last handle is dropped.
///
/// `close` may race with I/O running concurrently on another handle: an
/// in-flight system call can observe the descriptor number after it was
/// closed, and even after the number was reused by the process. Callers
/// that close a socket while other tasks use it must tolerate that.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<Inner>,
}

/// Counters describing how often a socket had to wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketStats {
    /// Wait requests submitted by reads and accepts.
    pub read_waits: u64,

    /// Wait requests submitted by writes and connects.
    pub write_waits: u64,
}

/// State shared by every handle of a socket and by the poll server.
pub(crate) struct Inner {
    fd: AtomicI32,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    read: Half,
    write: Half,
    pub(crate) server: PollServer,
}

impl Inner {
    /// Current descriptor, or `-1` once closed.
    pub(crate) fn fd(&self) -> RawFd {
        self.fd.load(Ordering::Acquire)
    }

    pub(crate) fn half(&self, direction: Direction) -> &Half {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let fd = *self.fd.get_mut();

        if fd >= 0 {
            let _ = platform::close(fd);
        }
    }
}

impl Socket {
    /// Wraps a raw descriptor, forcing non-blocking mode.
    ///
    /// Takes ownership of `fd`: it is closed if wrapping fails.
    pub(crate) fn new(
        fd: RawFd,
        local: Option<SocketAddr>,
        peer: Option<SocketAddr>,
        server: PollServer,
    ) -> io::Result<Self> {
        if let Err(e) = platform::set_nonblocking(fd, true) {
            let _ = platform::close(fd);
            return Err(e);
        }

        let inner = Inner {
            fd: AtomicI32::new(fd),
            local,
            peer,
            read: Half::new(),
            write: Half::new(),
            server,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Adopts a descriptor on the process-wide poll server, starting the
    /// server if needed.
    pub fn from_fd(fd: OwnedFd) -> io::Result<Self> {
        Self::attach(fd, &PollServer::global()?)
    }

    /// Adopts a descriptor on a specific poll server.
    ///
    /// Local and peer addresses are recorded when the descriptor is an
    /// IP socket.
    pub fn attach(fd: OwnedFd, server: &PollServer) -> io::Result<Self> {
        let fd = fd.into_raw_fd();
        let local = platform::sockname(fd).ok();
        let peer = platform::peername(fd).ok();

        Self::new(fd, local, peer, server.clone())
    }

    /// Creates a connected pair of Unix stream sockets on the process-wide
    /// poll server.
    pub fn pair() -> io::Result<(Socket, Socket)> {
        Self::pair_on(&PollServer::global()?)
    }

    /// Creates a connected pair of Unix stream sockets on `server`.
    pub fn pair_on(server: &PollServer) -> io::Result<(Socket, Socket)> {
        let (a, b) = platform::socketpair()?;

        let a = match Socket::new(a, None, None, server.clone()) {
            Ok(socket) => socket,
            Err(e) => {
                let _ = platform::close(b);
                return Err(e);
            }
        };
        let b = Socket::new(b, None, None, server.clone())?;

        Ok((a, b))
    }

    /// Reads into `buf`, suspending the task until data, end of stream,
    /// an error, or the read deadline.
    ///
    /// Returns `Ok(0)` at end of stream.
    ///
    /// # Errors
    ///
    /// - [`TimedOut`](io::ErrorKind::TimedOut) when the read deadline
    ///   expires,
    /// - [`InvalidInput`](io::ErrorKind::InvalidInput) when the socket is
    ///   closed, including by another handle while this call waits,
    /// - any error of `read(2)`.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.live_fd()?;

        let half = &self.inner.read;
        let _guard = half.lock.lock().await;
        half.begin();

        loop {
            match platform::read(self.live_fd()?, buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            self.wait(Direction::Read).await?;
        }
    }

    /// Writes as much of `buf` as possible, suspending the task whenever
    /// the socket buffer is full.
    ///
    /// Returns once the whole buffer is written, or with the count
    /// written so far when a write makes no progress. If an error or the
    /// deadline interrupts a write that already transferred bytes, the
    /// count is returned and the error is reported by the next call.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.live_fd()?;

        if buf.is_empty() {
            return Ok(0);
        }

        let half = &self.inner.write;
        let _guard = half.lock.lock().await;
        half.begin();

        let mut written = 0;

        loop {
            let fd = match self.live_fd() {
                Ok(fd) => fd,
                Err(e) => return partial(written, e),
            };

            match platform::write(fd, &buf[written..]) {
                Ok(0) => return Ok(written),
                Ok(n) => {
                    written += n;

                    if written == buf.len() {
                        return Ok(written);
                    }

                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return partial(written, e),
            }

            if let Err(e) = self.wait(Direction::Write).await {
                return partial(written, e);
            }
        }
    }

    /// Writes the entire buffer.
    ///
    /// # Errors
    ///
    /// Returns `WriteZero` if a write makes no progress, and otherwise the
    /// first error reported by [`write`](Self::write).
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero bytes",
                ));
            }

            buf = &buf[n..];
        }

        Ok(())
    }

    /// Accepts a connection on a listening socket.
    ///
    /// Accepts are serialized with reads and obey the read deadline. The
    /// new socket is close-on-exec, non-blocking and attached to the same
    /// poll server.
    pub async fn accept(&self) -> io::Result<Socket> {
        self.live_fd()?;

        let half = &self.inner.read;
        let _guard = half.lock.lock().await;
        half.begin();

        loop {
            let fd = self.live_fd()?;

            // Held across accept and close-on-exec only, never across a
            // suspension.
            let attempt = {
                let _fork = fork_read();

                platform::accept(fd).and_then(|(client, peer)| match platform::set_cloexec(client) {
                    Ok(()) => Ok((client, peer)),
                    Err(e) => {
                        let _ = platform::close(client);
                        Err(e)
                    }
                })
            };

            match attempt {
                Ok((client, peer)) => {
                    let local = platform::sockname(client).ok();
                    return Socket::new(client, local, Some(peer), self.inner.server.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::ECONNABORTED) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            self.wait(Direction::Read).await?;
        }
    }

    /// Connects to `addr`, suspending the task until the connection is
    /// established or fails. Obeys the write deadline.
    pub(crate) async fn connect(&self, addr: &SocketAddr) -> io::Result<()> {
        self.live_fd()?;

        let half = &self.inner.write;
        let _guard = half.lock.lock().await;
        half.begin();

        match platform::connect(self.live_fd()?, addr) {
            Ok(()) => return Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }

        loop {
            self.wait(Direction::Write).await?;

            let fd = self.live_fd()?;
            platform::take_socket_error(fd)?;

            match platform::peername(fd) {
                Ok(_) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::ENOTCONN) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Closes the socket.
    ///
    /// Any task waiting on the socket is woken and fails with
    /// [`InvalidInput`](io::ErrorKind::InvalidInput). The descriptor is
    /// switched back to blocking mode before the close so that lingering
    /// data is flushed, which may block the caller briefly.
    ///
    /// # Errors
    ///
    /// Closing a socket twice fails with `InvalidInput`.
    pub fn close(&self) -> io::Result<()> {
        let fd = self.inner.fd.swap(CLOSED, Ordering::AcqRel);

        if fd < 0 {
            return Err(error::closed());
        }

        self.inner.server.evict(&self.inner, fd);

        let _ = platform::set_nonblocking(fd, false);
        platform::close(fd)
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.fd() < 0
    }

    /// Sets the per-call read timeout. Each read or accept gets
    /// `timeout` from its start. `None` or a zero duration disables it.
    ///
    /// Replaces any deadline set with [`set_read_deadline`](Self::set_read_deadline).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.inner.read.set_timeout(timeout);
    }

    /// Sets the per-call write timeout. See [`set_read_timeout`](Self::set_read_timeout).
    pub fn set_write_timeout(&self, timeout: Option<Duration>) {
        self.inner.write.set_timeout(timeout);
    }

    /// Sets both per-call timeouts.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.set_read_timeout(timeout);
        self.set_write_timeout(timeout);
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.inner.read.timeout()
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.inner.write.timeout()
    }

    /// Pins an absolute read deadline shared by every following read and
    /// accept.
    ///
    /// Once it has passed, those calls still try the system call once but
    /// fail with [`TimedOut`](io::ErrorKind::TimedOut) instead of waiting,
    /// until the deadline is moved or cleared with `None`.
    ///
    /// A read or accept already waiting is bound by the new deadline too:
    /// the poll server is told to re-read it, so the call fails once it
    /// passes even if it started without one. May block briefly while the
    /// server's request queue is full.
    pub fn set_read_deadline(&self, at: Option<Instant>) {
        self.inner.read.set_deadline(at);
        self.deadline_moved(at);
    }

    /// Pins an absolute write deadline. See [`set_read_deadline`](Self::set_read_deadline).
    pub fn set_write_deadline(&self, at: Option<Instant>) {
        self.inner.write.set_deadline(at);
        self.deadline_moved(at);
    }

    /// Pins both deadlines.
    pub fn set_deadline(&self, at: Option<Instant>) {
        self.inner.read.set_deadline(at);
        self.inner.write.set_deadline(at);
        self.deadline_moved(at);
    }

    /// Local address, as recorded at construction or queried from the
    /// kernel.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self.inner.local {
            Some(addr) => Ok(addr),
            None => platform::sockname(self.live_fd()?),
        }
    }

    /// Remote address, as recorded at construction or queried from the
    /// kernel.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self.inner.peer {
            Some(addr) => Ok(addr),
            None => platform::peername(self.live_fd()?),
        }
    }

    /// The underlying descriptor, or `-1` once closed.
    pub fn raw_fd(&self) -> RawFd {
        self.inner.fd()
    }

    /// Shuts down the read, write, or both halves of the connection.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        platform::shutdown(self.live_fd()?, how)
    }

    pub fn stats(&self) -> SocketStats {
        SocketStats {
            read_waits: self.inner.read.waits(),
            write_waits: self.inner.write.waits(),
        }
    }

    /// The poll server this socket is attached to.
    pub fn server(&self) -> &PollServer {
        &self.inner.server
    }

    /// Lets the poll server pick up a deadline that may be earlier than
    /// the one it sleeps on. A cleared deadline needs no notice: the
    /// server re-reads every deadline before expiring a wait.
    fn deadline_moved(&self, at: Option<Instant>) {
        if at.is_some() && !self.is_closed() {
            self.inner.server.reschedule();
        }
    }

    fn live_fd(&self) -> io::Result<RawFd> {
        match self.inner.fd() {
            fd if fd < 0 => Err(error::closed()),
            fd => Ok(fd),
        }
    }

    /// Waits for `direction` after a would-block, unless its deadline has
    /// already expired.
    async fn wait(&self, direction: Direction) -> io::Result<()> {
        if self.inner.half(direction).deadline.is_expired() {
            return Err(error::timed_out());
        }

        WaitFuture::new(&self.inner, direction).await
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("fd", &self.inner.fd())
            .field("local", &self.inner.local)
            .field("peer", &self.inner.peer)
            .finish()
    }
}

/// Result of a write interrupted by `err` after `written` bytes.
fn partial(written: usize, err: io::Error) -> io::Result<usize> {
    if written > 0 { Ok(written) } else { Err(err) }
}
