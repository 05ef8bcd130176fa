use super::stream::TcpStream;
use crate::server::PollServer;
use crate::socket::Socket;
use crate::sys::platform;

use std::io;
use std::net::SocketAddr;
use std::ops::Deref;

/// A TCP socket listening for connections.
///
/// It is the async equivalent of [`std::net::TcpListener`].
#[derive(Clone, Debug)]
pub struct TcpListener {
    socket: Socket,
}

impl TcpListener {
    /// Binds a TCP listener to the given address, on the process-wide
    /// poll server.
    ///
    /// The address must be a literal socket address, such as
    /// `"127.0.0.1:8080"` or `"[::1]:8080"`; host names are not resolved.
    ///
    /// This function:
    /// - creates a close-on-exec socket,
    /// - enables `SO_REUSEADDR`,
    /// - configures IPv6 dual-stack if applicable,
    /// - binds and starts listening.
    pub fn bind(address: &str) -> io::Result<Self> {
        Self::bind_on(address, &PollServer::global()?)
    }

    /// Binds a TCP listener attached to `server`.
    pub fn bind_on(address: &str, server: &PollServer) -> io::Result<Self> {
        let addr = platform::parse_sockaddr(address)?;
        let fd = platform::socket(platform::domain_of(&addr))?;

        let configured = platform::set_reuseaddr(fd)
            .and_then(|()| platform::set_dual_stack(fd, &addr))
            .and_then(|()| platform::bind(fd, &addr))
            .and_then(|()| platform::listen(fd))
            .and_then(|()| platform::sockname(fd));

        let local = match configured {
            Ok(local) => local,
            Err(e) => {
                let _ = platform::close(fd);
                return Err(e);
            }
        };

        log::debug!("listening on {local}");

        let socket = Socket::new(fd, Some(local), None, server.clone())?;

        Ok(Self { socket })
    }

    /// Waits for an incoming connection and returns it with the peer
    /// address.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let socket = self.socket.accept().await?;
        let peer = socket.peer_addr()?;

        Ok((TcpStream::from_socket(socket), peer))
    }

    /// Returns the underlying socket.
    pub fn into_socket(self) -> Socket {
        self.socket
    }
}

impl Deref for TcpListener {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.socket
    }
}
