//! Absolute deadlines shared between a socket and the poll server.
//!
//! A deadline is stored as signed nanoseconds on a process-wide monotonic
//! clock so that both the owning task and the poll server thread can
//! read and update it without a lock:
//!
//! - `0`: no deadline,
//! - `> 0`: the instant after which waits must fail,
//! - `< 0`: expired; stays expired until re-armed.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

const UNSET: i64 = 0;
const EXPIRED: i64 = -1;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Current time on the deadline clock. Always positive.
pub(crate) fn now() -> i64 {
    to_clock(Instant::now())
}

/// Converts an instant to the deadline clock. Instants before the clock
/// started map to `1`, which is always in the past.
fn to_clock(at: Instant) -> i64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    let nanos = at.saturating_duration_since(epoch).as_nanos();

    i64::try_from(nanos).unwrap_or(i64::MAX - 1).saturating_add(1)
}

/// Converts a positive clock difference back to a duration.
pub(crate) fn until(deadline: i64, now: i64) -> Duration {
    Duration::from_nanos(deadline.saturating_sub(now).max(0) as u64)
}

/// One direction's deadline.
pub(crate) struct Deadline(AtomicI64);

impl Deadline {
    pub(crate) const fn new() -> Self {
        Deadline(AtomicI64::new(UNSET))
    }

    /// Sets the deadline to `now + delta`, or clears it.
    pub(crate) fn arm(&self, delta: Option<Duration>) {
        let value = match delta {
            Some(d) => {
                let nanos = i64::try_from(d.as_nanos()).unwrap_or(i64::MAX);
                now().saturating_add(nanos)
            }
            None => UNSET,
        };

        self.0.store(value, Ordering::Release);
    }

    /// Pins the deadline to an absolute instant, or clears it.
    pub(crate) fn set_at(&self, at: Option<Instant>) {
        let value = at.map(to_clock).unwrap_or(UNSET);
        self.0.store(value, Ordering::Release);
    }

    /// Raw clock value, as used by the poll server's sweep.
    pub(crate) fn raw(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn is_expired(&self) -> bool {
        self.raw() < 0
    }

    /// Marks the deadline as passed.
    pub(crate) fn expire(&self) {
        self.0.store(EXPIRED, Ordering::Release);
    }
}
