use super::scheduler::Scheduler;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Run queue of the runtime owning the current worker thread.
    static CURRENT: RefCell<Option<Arc<Scheduler>>> = const { RefCell::new(None) };
}

/// Runs `f` with `scheduler` installed as the current thread's runtime,
/// restoring the previous one afterwards.
pub(crate) fn enter<R>(scheduler: Arc<Scheduler>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT.with(|cell| cell.replace(Some(scheduler)));
    let out = f();
    CURRENT.with(|cell| cell.replace(previous));

    out
}

/// The scheduler of the runtime the current thread belongs to.
pub(crate) fn current() -> Option<Arc<Scheduler>> {
    CURRENT.with(|cell| cell.borrow().clone())
}
