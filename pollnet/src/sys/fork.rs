use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Guards the window between creating a descriptor and marking it
/// close-on-exec.
///
/// Code that creates descriptors holds it for reading. Code that forks
/// child processes holds it for writing so that no half-configured
/// descriptor leaks into the child.
static FORK_LOCK: RwLock<()> = RwLock::new(());

/// Returns the process-wide fork lock.
///
/// Take it for writing around `fork`/`exec` sequences:
///
/// ```rust,ignore
/// let _guard = pollnet::fork_lock().write().unwrap();
/// let child = std::process::Command::new("true").spawn()?;
/// ```
pub fn fork_lock() -> &'static RwLock<()> {
    &FORK_LOCK
}

/// Acquires the fork lock for reading.
///
/// The guard is not `Send` and must be dropped before any `.await`.
pub(crate) fn read() -> RwLockReadGuard<'static, ()> {
    FORK_LOCK.read().unwrap_or_else(PoisonError::into_inner)
}
