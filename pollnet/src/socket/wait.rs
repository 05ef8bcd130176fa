use super::Inner;
use crate::poller::Direction;
use crate::server::Submit;

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

/// Single-slot wakeup queue of one socket direction.
///
/// The poll server deposits one signal per serviced registration; the
/// waiting task consumes one signal per resumption. Signals are counted,
/// so a wakeup delivered before the task parks is never lost.
pub(crate) struct WakeSlot {
    state: Mutex<SlotState>,
}

struct SlotState {
    signals: usize,
    waker: Option<Waker>,
}

impl WakeSlot {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                signals: 0,
                waker: None,
            }),
        }
    }

    /// Deposits `n` signals and wakes the parked task, if any.
    pub(crate) fn signal(&self, n: usize) {
        if n == 0 {
            return;
        }

        let waker = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.signals += n;
            state.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Consumes a signal, or parks the current task until one arrives.
    pub(crate) fn poll_signal(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.signals > 0 {
            state.signals -= 1;
            return Poll::Ready(());
        }

        match &state.waker {
            Some(w) if w.will_wake(cx.waker()) => {}
            _ => state.waker = Some(cx.waker().clone()),
        }

        Poll::Pending
    }
}

/// Suspends the current task until the poll server reports `direction`
/// ready on the socket, its deadline passes, or it is closed.
///
/// Resolves with an error only if the poll server is down.
pub(crate) struct WaitFuture<'a> {
    socket: &'a Arc<Inner>,
    direction: Direction,
    submitted: bool,
}

impl<'a> WaitFuture<'a> {
    pub(crate) fn new(socket: &'a Arc<Inner>, direction: Direction) -> Self {
        Self {
            socket,
            direction,
            submitted: false,
        }
    }
}

impl Future for WaitFuture<'_> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let half = this.socket.half(this.direction);
        let server = &this.socket.server;

        if !this.submitted {
            match server.submit_wait(this.socket, this.direction) {
                Submit::Queued => {
                    this.submitted = true;
                    half.note_wait();
                }

                // The server has been signalled and will drain the queue;
                // yield and try again rather than blocking the worker.
                Submit::Full => {
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }

                Submit::Down(err) => return Poll::Ready(Err(err)),
            }
        }

        if let Some(err) = server.failure() {
            return Poll::Ready(Err(err.into()));
        }

        half.slot.poll_signal(cx).map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn signal_before_park_is_kept() {
        let slot = WakeSlot::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        slot.signal(1);

        assert!(slot.poll_signal(&mut cx).is_ready());
        assert!(slot.poll_signal(&mut cx).is_pending());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signal_wakes_parked_task_once_per_delivery() {
        let slot = WakeSlot::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        assert!(slot.poll_signal(&mut cx).is_pending());

        slot.signal(2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        assert!(slot.poll_signal(&mut cx).is_ready());
        assert!(slot.poll_signal(&mut cx).is_ready());
        assert!(slot.poll_signal(&mut cx).is_pending());

        slot.signal(0);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
