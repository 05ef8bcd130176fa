use super::Request;
use super::wakeup::Wakeup;
use crate::error::PollServerError;
use crate::poller::{Direction, Poller};
use crate::socket::Inner;
use crate::socket::deadline;

use log::{debug, error, trace, warn};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, OnceLock, Weak};

/// The poll server loop.
///
/// Runs on its own thread and is the only code that touches the poller,
/// the pending set and the nearest deadline. Tasks talk to it through
/// the request queue and the wakeup pipe.
pub(crate) struct Server {
    /// Readiness backend.
    poller: Box<dyn Poller>,

    /// Receiving side of the bounded request queue.
    receiver: Receiver<Request>,

    /// Self-wakeup pipe; its read end is registered with `poller`.
    wakeup: Arc<Wakeup>,

    /// Set once when the loop dies of a poller failure.
    status: Arc<OnceLock<PollServerError>>,

    /// Sockets waiting for readiness, keyed by descriptor and direction.
    ///
    /// Entries do not keep the socket alive: a wait abandoned by its task
    /// must not hold the descriptor open once every handle is gone.
    pending: HashMap<(RawFd, Direction), Weak<Inner>>,

    /// Nearest deadline among `pending`, `0` if none.
    deadline: i64,
}

impl Server {
    pub(crate) fn new(
        poller: Box<dyn Poller>,
        receiver: Receiver<Request>,
        wakeup: Arc<Wakeup>,
        status: Arc<OnceLock<PollServerError>>,
    ) -> Self {
        Self {
            poller,
            receiver,
            wakeup,
            status,
            pending: HashMap::new(),
            deadline: 0,
        }
    }

    /// Runs until the poller fails or every handle to the server is gone.
    ///
    /// Each iteration computes the timeout from the nearest deadline,
    /// blocks in the poller, then handles whatever woke it up.
    pub(crate) fn run(mut self) {
        debug!("poll server started");

        loop {
            let timeout = if self.deadline > 0 {
                let now = deadline::now();

                if self.deadline <= now {
                    self.check_deadlines(now);
                    continue;
                }

                Some(deadline::until(self.deadline, now))
            } else {
                None
            };

            match self.poller.wait(timeout) {
                Err(err) => {
                    self.fail(err);
                    return;
                }

                Ok(None) => {
                    if self.deadline > 0 {
                        self.check_deadlines(deadline::now());
                    }
                }

                Ok(Some((fd, Direction::Read))) if fd == self.wakeup.reader() => {
                    self.wakeup.drain();

                    if !self.drain_requests() {
                        debug!("poll server stopped: no handles left");
                        return;
                    }
                }

                Ok(Some((fd, direction))) => match self.pending.remove(&(fd, direction)) {
                    Some(socket) => match socket.upgrade() {
                        Some(socket) => {
                            trace!("fd {fd} ready for {direction:?}");
                            wake(&socket, direction);
                        }
                        None => trace!("fd {fd} ready for {direction:?} after its socket was dropped"),
                    },
                    None => warn!("poll server: fd {fd} ready for {direction:?} but nothing waits"),
                },
            }
        }
    }

    /// Handles every queued request.
    ///
    /// Returns `false` once all senders are gone and the queue is empty.
    fn drain_requests(&mut self) -> bool {
        let mut handled = 0usize;

        let alive = loop {
            match self.receiver.try_recv() {
                Ok(Request::Wait { socket, direction }) => self.register_wait(socket, direction),
                Ok(Request::Evict { socket, fd }) => self.evict(&socket, fd),
                Ok(Request::Reschedule) => self.check_deadlines(deadline::now()),
                Err(TryRecvError::Empty) => break true,
                Err(TryRecvError::Disconnected) => break false,
            }

            handled += 1;
        };

        if handled > 0 {
            debug!("poll server handled {handled} request(s), {} pending", self.pending.len());
        }

        alive
    }

    /// Registers interest of `socket` in `direction`.
    ///
    /// A socket that is already closed, or whose deadline has expired, is
    /// signalled straight away so that its task observes the condition.
    fn register_wait(&mut self, socket: Arc<Inner>, direction: Direction) {
        let fd = socket.fd();
        let half = socket.half(direction);

        if fd < 0 || half.deadline.is_expired() {
            half.slot.signal(1);
            return;
        }

        if let Err(err) = self.poller.register(fd, direction, false) {
            warn!("poll server: cannot watch fd {fd} for {direction:?}: {err}");
            half.slot.signal(1);
            return;
        }

        trace!("fd {fd} waits for {direction:?}");

        let at = half.deadline.raw();
        if at > 0 && (self.deadline == 0 || at < self.deadline) {
            self.deadline = at;
        }

        half.outstanding.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.pending.insert((fd, direction), Arc::downgrade(&socket))
            && !ptr::eq(previous.as_ptr(), Arc::as_ptr(&socket))
            && let Some(previous) = previous.upgrade()
        {
            wake(&previous, direction);
        }
    }

    /// Drops any registration `socket` holds under its former descriptor
    /// and wakes the waiter.
    fn evict(&mut self, socket: &Arc<Inner>, fd: RawFd) {
        for direction in Direction::ALL {
            let key = (fd, direction);

            let owned = self
                .pending
                .get(&key)
                .is_some_and(|pending| ptr::eq(pending.as_ptr(), Arc::as_ptr(socket)));

            if owned {
                self.pending.remove(&key);
                self.poller.unregister(fd, direction);
                trace!("fd {fd} evicted from {direction:?} wait");
                wake(socket, direction);
            }
        }
    }

    /// Expires every pending wait whose deadline has passed and
    /// recomputes the nearest deadline from the rest.
    fn check_deadlines(&mut self, now: i64) {
        let mut nearest = 0;
        let mut expired = Vec::new();
        let mut dropped = Vec::new();

        self.pending.retain(|&(fd, direction), socket| {
            let Some(socket) = socket.upgrade() else {
                dropped.push((fd, direction));
                return false;
            };

            let at = socket.half(direction).deadline.raw();

            if at < 0 || (at > 0 && at <= now) {
                expired.push((fd, direction, socket));
                return false;
            }

            if at > 0 && (nearest == 0 || at < nearest) {
                nearest = at;
            }

            true
        });

        self.deadline = nearest;

        for (fd, direction) in dropped {
            self.poller.unregister(fd, direction);
        }

        for (fd, direction, socket) in expired {
            self.poller.unregister(fd, direction);
            socket.half(direction).deadline.expire();
            trace!("fd {fd} deadline expired for {direction:?}");
            wake(&socket, direction);
        }
    }

    /// Records the failure, releases every waiter and stops.
    ///
    /// The status is set before the queue is drained, so a task that
    /// enqueues afterwards sees the failure when it next checks.
    fn fail(&mut self, err: io::Error) {
        error!("poll server stopped: poller wait failed: {err}");

        let _ = self.status.set(PollServerError::poller_failed(&err));

        for ((_, direction), socket) in self.pending.drain() {
            if let Some(socket) = socket.upgrade() {
                wake(&socket, direction);
            }
        }

        while let Ok(request) = self.receiver.try_recv() {
            if let Request::Wait { socket, direction } = request {
                socket.half(direction).slot.signal(1);
            }
        }

        self.deadline = 0;
    }
}

/// Delivers one signal per outstanding registration of `direction`.
fn wake(socket: &Inner, direction: Direction) {
    let half = socket.half(direction);
    let n = half.outstanding.swap(0, Ordering::Relaxed);

    half.slot.signal(n.max(1));
}
