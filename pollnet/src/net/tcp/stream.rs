use crate::server::PollServer;
use crate::socket::Socket;
use crate::sys::platform;

use std::io;
use std::ops::Deref;
use std::time::Duration;

/// A connected TCP stream.
///
/// Dereferences to [`Socket`], which provides `read`, `write`,
/// `write_all`, `shutdown`, the deadline setters and `close`.
#[derive(Clone, Debug)]
pub struct TcpStream {
    socket: Socket,
}

impl TcpStream {
    pub(crate) fn from_socket(socket: Socket) -> Self {
        Self { socket }
    }

    /// Establishes a TCP connection to `address`, on the process-wide poll
    /// server.
    ///
    /// The address must be a literal socket address such as
    /// `"127.0.0.1:8080"` or `"[::1]:8080"`.
    pub async fn connect(address: &str) -> io::Result<Self> {
        Self::connect_on(address, &PollServer::global()?).await
    }

    /// Establishes a TCP connection attached to `server`.
    pub async fn connect_on(address: &str, server: &PollServer) -> io::Result<Self> {
        Self::connect_with(address, server, None).await
    }

    /// Like [`connect`](Self::connect), failing with
    /// [`TimedOut`](io::ErrorKind::TimedOut) if the connection is not
    /// established within `timeout`.
    pub async fn connect_timeout(address: &str, timeout: Duration) -> io::Result<Self> {
        Self::connect_with(address, &PollServer::global()?, Some(timeout)).await
    }

    async fn connect_with(
        address: &str,
        server: &PollServer,
        timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let addr = platform::parse_sockaddr(address)?;
        let fd = platform::socket(platform::domain_of(&addr))?;

        let socket = Socket::new(fd, None, Some(addr), server.clone())?;

        socket.set_write_timeout(timeout);
        socket.connect(&addr).await?;
        socket.set_write_timeout(None);

        Ok(Self { socket })
    }

    /// Returns the underlying socket.
    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

impl Deref for TcpStream {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.socket
    }
}
