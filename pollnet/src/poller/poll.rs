//! Portable `poll(2)`-based poller implementation.
//!
//! Used on Unix targets without `epoll`. The interest set is rebuilt into
//! a `pollfd` array on every wait, which is linear in the number of
//! watched descriptors but needs no kernel-side registration.

use super::{Direction, Poller, timeout_millis};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, nfds_t, pollfd};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Registration state of one direction: `Some(persistent)` when armed.
#[derive(Default, Clone, Copy)]
struct Entry {
    read: Option<bool>,
    write: Option<bool>,
}

impl Entry {
    fn slot(&mut self, direction: Direction) -> &mut Option<bool> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

/// `poll(2)` poller.
pub(crate) struct PollPoller {
    /// Watched descriptors.
    interest: HashMap<RawFd, Entry>,

    /// Ready directions collected but not yet returned.
    ready: VecDeque<(RawFd, Direction)>,

    /// Reusable `pollfd` buffer.
    fds: Vec<pollfd>,
}

impl PollPoller {
    /// Creates a new `PollPoller`.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            interest: HashMap::new(),
            ready: VecDeque::with_capacity(capacity),
            fds: Vec::with_capacity(capacity),
        })
    }
}

impl Poller for PollPoller {
    fn register(&mut self, fd: RawFd, direction: Direction, persistent: bool) -> io::Result<()> {
        if fd < 0 {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        let entry = self.interest.entry(fd).or_default();
        let slot = entry.slot(direction);
        *slot = Some(slot.unwrap_or(false) || persistent);

        Ok(())
    }

    fn unregister(&mut self, fd: RawFd, direction: Direction) {
        self.ready.retain(|&(f, d)| !(f == fd && d == direction));

        if let Some(entry) = self.interest.get_mut(&fd) {
            *entry.slot(direction) = None;

            if entry.is_empty() {
                self.interest.remove(&fd);
            }
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Option<(RawFd, Direction)>> {
        if let Some(ready) = self.ready.pop_front() {
            return Ok(Some(ready));
        }

        self.fds.clear();
        for (&fd, entry) in &self.interest {
            let mut events = 0;
            if entry.read.is_some() {
                events |= POLLIN;
            }
            if entry.write.is_some() {
                events |= POLLOUT;
            }

            self.fds.push(pollfd {
                fd,
                events,
                revents: 0,
            });
        }

        let n = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as nfds_t,
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

        for i in 0..self.fds.len() {
            let pollfd { fd, revents, .. } = self.fds[i];
            if revents == 0 {
                continue;
            }

            let Some(entry) = self.interest.get_mut(&fd) else {
                continue;
            };

            let hangup = revents & (POLLHUP | POLLERR | POLLNVAL) != 0;

            if let Some(persistent) = entry.read
                && (revents & POLLIN != 0 || hangup)
            {
                self.ready.push_back((fd, Direction::Read));
                if !persistent {
                    entry.read = None;
                }
            }

            if let Some(persistent) = entry.write
                && (revents & POLLOUT != 0 || hangup)
            {
                self.ready.push_back((fd, Direction::Write));
                if !persistent {
                    entry.write = None;
                }
            }

            // A closed descriptor would be reported on every call.
            if entry.is_empty() || revents & POLLNVAL != 0 {
                self.interest.remove(&fd);
            }
        }

        Ok(self.ready.pop_front())
    }
}
