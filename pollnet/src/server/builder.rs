use super::core::Server;
use super::wakeup::Wakeup;
use super::{PollServer, Shared, install};
use crate::poller::{self, Direction, Poller};

use std::io;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread;

/// Builder for configuring and starting a poll server.
///
/// # Examples
///
/// ```rust,ignore
/// let server = PollServer::builder()
///     .request_capacity(256)
///     .thread_name("my-poll-server")
///     .spawn()?;
/// ```
pub struct PollServerBuilder {
    /// Bound of the request queue.
    request_capacity: usize,

    /// Kernel events collected per poller call.
    event_capacity: usize,

    /// Name of the server thread.
    thread_name: String,

    /// Custom poller, or `None` for the platform default.
    poller: Option<Box<dyn Poller>>,
}

impl PollServerBuilder {
    /// Creates a builder with default configuration: a request queue of
    /// 64 entries, 64 events per poller call and a thread named
    /// `pollnet-poll-server`.
    pub fn new() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 64,
            thread_name: "pollnet-poll-server".to_owned(),
            poller: None,
        }
    }

    /// Sets how many requests may wait in the queue before submitters
    /// have to yield.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn request_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "request_capacity must be > 0");

        self.request_capacity = n;
        self
    }

    /// Sets how many readiness events the platform poller collects per
    /// system call. Ignored when a custom poller is supplied.
    pub fn event_capacity(mut self, n: usize) -> Self {
        self.event_capacity = n.max(1);
        self
    }

    /// Sets the name of the server thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Uses `poller` instead of the platform default.
    pub fn poller(mut self, poller: impl Poller + 'static) -> Self {
        self.poller = Some(Box::new(poller));
        self
    }

    /// Starts a private poll server.
    ///
    /// Creates the wakeup pipe and the poller, registers the pipe's read
    /// end persistently and spawns the server thread.
    pub fn spawn(self) -> io::Result<PollServer> {
        let mut poller = match self.poller {
            Some(poller) => poller,
            None => poller::platform(self.event_capacity)?,
        };

        let wakeup = Arc::new(Wakeup::new()?);
        poller.register(wakeup.reader(), Direction::Read, true)?;

        let (sender, receiver) = mpsc::sync_channel(self.request_capacity);
        let status = Arc::new(OnceLock::new());

        let server = Server::new(poller, receiver, wakeup.clone(), status.clone());

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || server.run())?;

        log::debug!(
            "spawned poll server thread {:?} (request capacity {})",
            self.thread_name,
            self.request_capacity
        );

        Ok(PollServer {
            shared: Arc::new(Shared {
                sender: Some(sender),
                wakeup,
                status,
            }),
        })
    }

    /// Starts the poll server and installs it as the process-wide
    /// instance returned by [`PollServer::global`].
    ///
    /// # Errors
    ///
    /// Fails with [`PollServerError::AlreadyStarted`](crate::PollServerError::AlreadyStarted)
    /// if a global instance already exists.
    pub fn install(self) -> io::Result<PollServer> {
        install(self, true)
    }
}

impl Default for PollServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
