use super::deadline::Deadline;
use super::lock::IoLock;
use super::wait::WakeSlot;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// The per-direction state of a socket.
///
/// A socket has one `Half` for reading (also used by accept) and one for
/// writing (also used by connect).
pub(crate) struct Half {
    /// Serializes callers in this direction.
    pub(crate) lock: IoLock,

    /// Deadline of the call in progress.
    pub(crate) deadline: Deadline,

    /// Per-call timeout in nanoseconds, `0` for none.
    timeout: AtomicU64,

    /// Whether `deadline` was pinned by the caller and must not be
    /// recomputed from `timeout`.
    pinned: AtomicBool,

    /// Where the poll server delivers wakeups.
    pub(crate) slot: WakeSlot,

    /// Registrations not yet woken. Only the poll server thread touches
    /// this counter.
    pub(crate) outstanding: AtomicUsize,

    /// Wait requests submitted over the socket's lifetime.
    waits: AtomicU64,
}

impl Half {
    pub(crate) const fn new() -> Self {
        Self {
            lock: IoLock::new(),
            deadline: Deadline::new(),
            timeout: AtomicU64::new(0),
            pinned: AtomicBool::new(false),
            slot: WakeSlot::new(),
            outstanding: AtomicUsize::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// Prepares the deadline for a new call. Must be called with `lock`
    /// held.
    pub(crate) fn begin(&self) {
        if self.pinned.load(Ordering::Acquire) {
            return;
        }

        let nanos = self.timeout.load(Ordering::Acquire);
        let delta = (nanos > 0).then(|| Duration::from_nanos(nanos));

        self.deadline.arm(delta);
    }

    pub(crate) fn set_timeout(&self, timeout: Option<Duration>) {
        let nanos = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        self.timeout.store(nanos, Ordering::Release);
        self.pinned.store(false, Ordering::Release);
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        match self.timeout.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    pub(crate) fn set_deadline(&self, at: Option<Instant>) {
        self.pinned.store(at.is_some(), Ordering::Release);
        self.deadline.set_at(at);
    }

    pub(crate) fn note_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_arms_from_timeout() {
        let half = Half::new();

        half.begin();
        assert_eq!(half.deadline.raw(), 0);

        half.set_timeout(Some(Duration::from_secs(5)));
        half.begin();
        assert!(half.deadline.raw() > 0);

        half.set_timeout(Some(Duration::ZERO));
        half.begin();
        assert_eq!(half.deadline.raw(), 0);
        assert_eq!(half.timeout(), None);
    }

    #[test]
    fn begin_resets_an_expired_per_call_deadline() {
        let half = Half::new();
        half.set_timeout(Some(Duration::from_secs(5)));

        half.begin();
        half.deadline.expire();
        half.begin();

        assert!(!half.deadline.is_expired());
    }

    #[test]
    fn pinned_deadline_survives_begin() {
        let half = Half::new();
        half.set_timeout(Some(Duration::from_secs(5)));
        half.set_deadline(Some(Instant::now() + Duration::from_secs(60)));

        half.deadline.expire();
        half.begin();
        assert!(half.deadline.is_expired());

        half.set_deadline(None);
        half.begin();
        assert!(!half.deadline.is_expired());
        assert!(half.deadline.raw() > 0);
    }
}
