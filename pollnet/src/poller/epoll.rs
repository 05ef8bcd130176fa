//! Linux `epoll`-based poller implementation.
//!
//! Each descriptor is registered once with the union of the directions
//! currently wanted. Non-persistent registrations use `EPOLLONESHOT`,
//! which disarms the whole descriptor when it fires; the poller then
//! re-arms whatever directions are still wanted.
//!
//! A single `epoll_wait` can report several ready directions. They are
//! buffered and handed out one per [`Poller::wait`] call.

use super::{Direction, Poller, timeout_millis};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLONESHOT, EPOLLOUT, EEXIST, ENOENT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

const READ_BITS: u32 = EPOLLIN as u32;
const WRITE_BITS: u32 = EPOLLOUT as u32;
const ONESHOT: u32 = EPOLLONESHOT as u32;

/// Linux `epoll` poller.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Currently armed event mask per descriptor.
    interest: HashMap<RawFd, u32>,

    /// Ready directions collected but not yet returned.
    ready: VecDeque<(RawFd, Direction)>,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,
}

impl EpollPoller {
    /// Creates a new `EpollPoller` collecting up to `capacity` events per
    /// system call.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let capacity = capacity.max(1);

        Ok(Self {
            epoll,
            interest: HashMap::new(),
            ready: VecDeque::with_capacity(capacity),
            events: vec![epoll_event { events: 0, u64: 0 }; capacity],
        })
    }

    fn ctl(&self, op: i32, fd: RawFd, events: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Arms `fd` with `events`, adding or modifying as needed.
    ///
    /// The interest map can be stale when a descriptor was closed and its
    /// number reused, so both `ADD` and `MOD` fall back to each other.
    fn arm(&self, fd: RawFd, events: u32, known: bool) -> io::Result<()> {
        let (first, second, fallback_errno) = if known {
            (EPOLL_CTL_MOD, EPOLL_CTL_ADD, ENOENT)
        } else {
            (EPOLL_CTL_ADD, EPOLL_CTL_MOD, EEXIST)
        };

        match self.ctl(first, fd, events) {
            Err(e) if e.raw_os_error() == Some(fallback_errno) => self.ctl(second, fd, events),
            other => other,
        }
    }

    /// Records what fired for a one-shot descriptor and re-arms the
    /// directions that are still wanted.
    fn consume(&mut self, fd: RawFd, fired: u32) {
        let Some(armed) = self.interest.get(&fd).copied() else {
            return;
        };

        if armed & ONESHOT == 0 {
            return;
        }

        let remaining = armed & !fired;

        if remaining & (READ_BITS | WRITE_BITS) == 0 {
            self.interest.remove(&fd);
            let _ = self.ctl(EPOLL_CTL_DEL, fd, 0);
        } else {
            self.interest.insert(fd, remaining);
            let _ = self.arm(fd, remaining, true);
        }
    }
}

impl Poller for EpollPoller {
    fn register(&mut self, fd: RawFd, direction: Direction, persistent: bool) -> io::Result<()> {
        let current = self.interest.get(&fd).copied();

        let mut events = current.unwrap_or(0) | bits(direction);
        if !persistent {
            events |= ONESHOT;
        }

        self.arm(fd, events, current.is_some())?;
        self.interest.insert(fd, events);

        Ok(())
    }

    fn unregister(&mut self, fd: RawFd, direction: Direction) {
        self.ready.retain(|&(f, d)| !(f == fd && d == direction));

        let Some(armed) = self.interest.get(&fd).copied() else {
            return;
        };

        let remaining = armed & !bits(direction);

        if remaining & (READ_BITS | WRITE_BITS) == 0 {
            self.interest.remove(&fd);
            let _ = self.ctl(EPOLL_CTL_DEL, fd, 0);
        } else {
            self.interest.insert(fd, remaining);
            let _ = self.arm(fd, remaining, true);
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Option<(RawFd, Direction)>> {
        if let Some(ready) = self.ready.pop_front() {
            return Ok(Some(ready));
        }

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_millis(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(None);
            }
            return Err(err);
        }

        for i in 0..n as usize {
            let flags = self.events[i].events;
            let fd = self.events[i].u64 as RawFd;

            let Some(armed) = self.interest.get(&fd).copied() else {
                continue;
            };

            let hangup = flags & ((EPOLLHUP | EPOLLERR) as u32) != 0;
            let mut fired = 0;

            if armed & READ_BITS != 0 && (flags & READ_BITS != 0 || hangup) {
                self.ready.push_back((fd, Direction::Read));
                fired |= READ_BITS;
            }

            if armed & WRITE_BITS != 0 && (flags & WRITE_BITS != 0 || hangup) {
                self.ready.push_back((fd, Direction::Write));
                fired |= WRITE_BITS;
            }

            self.consume(fd, fired);
        }

        Ok(self.ready.pop_front())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}

fn bits(direction: Direction) -> u32 {
    match direction {
        Direction::Read => READ_BITS,
        Direction::Write => WRITE_BITS,
    }
}
