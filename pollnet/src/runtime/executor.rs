use super::context;
use super::scheduler::Scheduler;

use log::{debug, error};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Worker threads of a runtime.
pub(crate) struct Executor {
    /// Run queue shared with the workers.
    scheduler: Arc<Scheduler>,

    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl Executor {
    /// Spawns `threads` workers named `{name}-{id}`.
    pub(crate) fn new(threads: usize, name: &str) -> Self {
        let scheduler = Arc::new(Scheduler::new());
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let scheduler = scheduler.clone();

            let spawned = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || run(scheduler));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!("failed to spawn worker thread {id}: {e}"),
            }
        }

        debug!("runtime started with {} worker thread(s)", handles.len());

        Self { scheduler, handles }
    }

    pub(crate) fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Signals every worker to stop.
    pub(crate) fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Waits for all worker threads to terminate.
    pub(crate) fn join(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Worker loop: poll whatever is queued until shutdown.
fn run(scheduler: Arc<Scheduler>) {
    context::enter(scheduler.clone(), || {
        while let Some(task) = scheduler.next() {
            task.run();
        }
    });
}
