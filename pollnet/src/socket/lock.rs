use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll, Waker};

/// An asynchronous lock serializing the I/O calls of one direction.
///
/// Tasks that cannot take the lock are suspended instead of blocking
/// their worker thread, and are woken in arrival order when it is
/// released.
pub(crate) struct IoLock {
    /// Whether a guard is currently alive.
    locked: AtomicBool,

    /// Tasks waiting for the lock, tagged with the id of their future.
    waiters: Mutex<VecDeque<(u64, Waker)>>,

    /// Source of waiter ids.
    next_id: AtomicU64,
}

impl IoLock {
    pub(crate) const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Returns a future resolving to a guard once the lock is held.
    pub(crate) fn lock(&self) -> IoLockFuture<'_> {
        IoLockFuture {
            lock: self,
            id: None,
        }
    }

    fn try_acquire(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Removes the longest-waiting task from the queue.
    fn next(waiters: &mut VecDeque<(u64, Waker)>) -> Option<Waker> {
        waiters.pop_front().map(|(_, waker)| waker)
    }
}

/// Future returned by [`IoLock::lock`].
pub(crate) struct IoLockFuture<'a> {
    lock: &'a IoLock,

    /// Id under which this future queued its waker, once it had to wait.
    id: Option<u64>,
}

impl<'a> Future for IoLockFuture<'a> {
    type Output = IoLockGuard<'a>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let lock = this.lock;

        if lock.try_acquire() {
            this.forget(lock);
            return Poll::Ready(IoLockGuard { lock });
        }

        let mut waiters = lock.waiters.lock().unwrap_or_else(PoisonError::into_inner);

        // Re-check under the waiter list: a release that happened between
        // the first attempt and here has already looked at the list.
        if lock.try_acquire() {
            if let Some(id) = this.id.take() {
                waiters.retain(|(queued, _)| *queued != id);
            }
            return Poll::Ready(IoLockGuard { lock });
        }

        let id = *this
            .id
            .get_or_insert_with(|| lock.next_id.fetch_add(1, Ordering::Relaxed));

        match waiters.iter_mut().find(|(queued, _)| *queued == id) {
            Some((_, waker)) => waker.clone_from(cx.waker()),
            None => waiters.push_back((id, cx.waker().clone())),
        }

        Poll::Pending
    }
}

impl IoLockFuture<'_> {
    /// Drops this future's entry from the waiter list, if it has one.
    fn forget(&mut self, lock: &IoLock) {
        if let Some(id) = self.id.take() {
            lock.waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(queued, _)| *queued != id);
        }
    }
}

impl Drop for IoLockFuture<'_> {
    /// Leaves the queue. A future that was already handed the wakeup for
    /// a release, and never took the lock, passes it on to the next
    /// waiter.
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };

        let next = {
            let mut waiters = self
                .lock
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            let before = waiters.len();
            waiters.retain(|(queued, _)| *queued != id);
            let handed_off = waiters.len() == before;

            // Releases happen under the waiter list, so a held lock will wake
            // the next waiter itself.
            if handed_off && !self.lock.locked.load(Ordering::Acquire) {
                IoLock::next(&mut waiters)
            } else {
                None
            }
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}

/// Guard returned by [`IoLock::lock`]; releases the lock on drop.
pub(crate) struct IoLockGuard<'a> {
    lock: &'a IoLock,
}

impl Drop for IoLockGuard<'_> {
    fn drop(&mut self) {
        let next = {
            let mut waiters = self
                .lock
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            self.lock.locked.store(false, Ordering::Release);
            IoLock::next(&mut waiters)
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}
