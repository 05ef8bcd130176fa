use libc::{
    AF_INET, AF_INET6, AF_UNIX, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, IPPROTO_IPV6,
    IPV6_V6ONLY, O_NONBLOCK, SHUT_RD, SHUT_RDWR, SHUT_WR, SO_ERROR, SO_REUSEADDR, SOCK_STREAM,
    SOL_SOCKET, c_int, c_void, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t,
};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::RawFd;
use std::str::FromStr;
use std::{io, mem};

/// Backlog passed to `listen(2)`.
pub(crate) const LISTEN_BACKLOG: c_int = 128;

/// Converts a `-1` syscall return into the current `errno`.
fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Reads from a file descriptor into the given buffer.
///
/// A would-block condition is reported as an error of kind
/// [`io::ErrorKind::WouldBlock`].
pub(crate) fn read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len()) };

    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Writes the buffer to a file descriptor.
pub(crate) fn write(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    #[cfg(test)]
    let buffer = match fault::next_write(fd) {
        Some(fault::Step::WouldBlock) => return Err(io::Error::from_raw_os_error(libc::EAGAIN)),
        Some(fault::Step::Short(limit)) => &buffer[..limit.min(buffer.len())],
        None => buffer,
    };

    let n = unsafe { libc::write(fd, buffer.as_ptr() as *const c_void, buffer.len()) };

    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Closes a file descriptor.
pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::close(fd) }).map(drop)
}

/// Switches a descriptor in or out of non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, F_GETFL) })?;

    let wanted = if nonblocking {
        flags | O_NONBLOCK
    } else {
        flags & !O_NONBLOCK
    };

    if wanted != flags {
        cvt(unsafe { libc::fcntl(fd, F_SETFL, wanted) })?;
    }

    Ok(())
}

/// Marks a descriptor so that it is not inherited across `exec`.
pub(crate) fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, F_GETFD) })?;

    if flags & FD_CLOEXEC == 0 {
        cvt(unsafe { libc::fcntl(fd, F_SETFD, flags | FD_CLOEXEC) })?;
    }

    Ok(())
}

/// Creates a close-on-exec stream socket.
///
/// The socket is left in blocking mode; wrapping it in a
/// [`Socket`](crate::Socket) switches it to non-blocking.
pub(crate) fn socket(domain: c_int) -> io::Result<RawFd> {
    let _fork = super::fork::read();

    let fd = cvt(unsafe { libc::socket(domain, SOCK_STREAM, 0) })?;

    if let Err(e) = set_cloexec(fd) {
        let _ = close(fd);
        return Err(e);
    }

    Ok(fd)
}

/// Creates a connected pair of `AF_UNIX` stream sockets.
pub(crate) fn socketpair() -> io::Result<(RawFd, RawFd)> {
    let _fork = super::fork::read();

    let mut fds: [c_int; 2] = [-1, -1];
    cvt(unsafe { libc::socketpair(AF_UNIX, SOCK_STREAM, 0, fds.as_mut_ptr()) })?;

    for fd in fds {
        if let Err(e) = set_cloexec(fd) {
            let _ = close(fds[0]);
            let _ = close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Creates a non-blocking, close-on-exec pipe.
///
/// Returns `(read_end, write_end)`.
pub(crate) fn pipe() -> io::Result<(RawFd, RawFd)> {
    let _fork = super::fork::read();

    let mut fds: [c_int; 2] = [-1, -1];
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;

    for fd in fds {
        let configured = set_cloexec(fd).and_then(|()| set_nonblocking(fd, true));

        if let Err(e) = configured {
            let _ = close(fds[0]);
            let _ = close(fds[1]);
            return Err(e);
        }
    }

    Ok((fds[0], fds[1]))
}

/// Binds a socket to an address.
pub(crate) fn bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);

    cvt(unsafe { libc::bind(fd, &storage as *const _ as *const sockaddr, len) }).map(drop)
}

/// Marks a socket as a listening socket.
pub(crate) fn listen(fd: RawFd) -> io::Result<()> {
    cvt(unsafe { libc::listen(fd, LISTEN_BACKLOG) }).map(drop)
}

/// Accepts a pending connection on a listening socket.
///
/// The returned descriptor inherits nothing from the listener; callers are
/// responsible for close-on-exec and non-blocking configuration.
pub(crate) fn accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client = cvt(unsafe { libc::accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok((client, addr)),
        Err(e) => {
            let _ = close(client);
            Err(e)
        }
    }
}

/// Initiates a connection.
///
/// On a non-blocking socket this usually fails with `EINPROGRESS`.
pub(crate) fn connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = socketaddr_to_storage(addr);

    cvt(unsafe { libc::connect(fd, &storage as *const _ as *const sockaddr, len) }).map(drop)
}

/// Reads and clears the pending socket error (`SO_ERROR`).
pub(crate) fn take_socket_error(fd: RawFd) -> io::Result<()> {
    let mut err: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    cvt(unsafe {
        libc::getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut c_void,
            &mut len,
        )
    })?;

    if err != 0 {
        Err(io::Error::from_raw_os_error(err))
    } else {
        Ok(())
    }
}

/// Returns the local address of a socket.
pub(crate) fn sockname(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { libc::getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    sockaddr_storage_to_socketaddr(&storage)
}

/// Returns the remote address of a connected socket.
pub(crate) fn peername(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    cvt(unsafe { libc::getpeername(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) })?;

    sockaddr_storage_to_socketaddr(&storage)
}

/// Shuts down a socket.
pub(crate) fn shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    cvt(unsafe { libc::shutdown(fd, how) }).map(drop)
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn set_reuseaddr(fd: RawFd) -> io::Result<()> {
    set_int_option(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Turns off `IPV6_V6ONLY` on IPv6 sockets so they also accept IPv4.
pub(crate) fn set_dual_stack(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    if addr.is_ipv6() {
        set_int_option(fd, IPPROTO_IPV6, IPV6_V6ONLY, 0)?;
    }

    Ok(())
}

fn set_int_option(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    })
    .map(drop)
}

/// Parses a literal socket address such as `"127.0.0.1:8080"` or `"[::1]:80"`.
///
/// Host names are not resolved.
pub(crate) fn parse_sockaddr(address: &str) -> io::Result<SocketAddr> {
    SocketAddr::from_str(address)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid socket address"))
}

/// Returns the address family matching a socket address.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    match addr {
        SocketAddr::V4(_) => AF_INET,
        SocketAddr::V6(_) => AF_INET6,
    }
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Ok(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

/// Scripted `write` outcomes, so tests can drive the partial write and
/// would-block paths without depending on kernel buffer sizes.
#[cfg(test)]
pub(crate) mod fault {
    use std::collections::VecDeque;
    use std::os::fd::RawFd;
    use std::sync::{Mutex, PoisonError};

    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Step {
        /// Transfer at most this many bytes.
        Short(usize),

        /// Fail with `EAGAIN` without touching the descriptor.
        WouldBlock,
    }

    static SCRIPTS: Mutex<Vec<(RawFd, VecDeque<Step>)>> = Mutex::new(Vec::new());

    /// Makes the next writes to `fd` follow `steps` in order. Writes
    /// behave normally again once the script is used up.
    pub(crate) fn script_writes(fd: RawFd, steps: impl IntoIterator<Item = Step>) {
        let mut scripts = SCRIPTS.lock().unwrap_or_else(PoisonError::into_inner);

        scripts.retain(|(scripted, _)| *scripted != fd);
        scripts.push((fd, steps.into_iter().collect()));
    }

    pub(super) fn next_write(fd: RawFd) -> Option<Step> {
        let mut scripts = SCRIPTS.lock().unwrap_or_else(PoisonError::into_inner);

        let index = scripts.iter().position(|(scripted, _)| *scripted == fd)?;
        let step = scripts[index].1.pop_front();

        if scripts[index].1.is_empty() {
            scripts.swap_remove(index);
        }

        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_conversion_keeps_port_and_ip() {
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        let (storage, _) = socketaddr_to_storage(&addr);

        assert_eq!(sockaddr_storage_to_socketaddr(&storage).unwrap(), addr);

        let addr: SocketAddr = "[fe80::1]:80".parse().unwrap();
        let (storage, _) = socketaddr_to_storage(&addr);

        assert_eq!(sockaddr_storage_to_socketaddr(&storage).unwrap(), addr);
    }

    #[test]
    fn parse_rejects_host_names() {
        let err = parse_sockaddr("localhost:80").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn pipe_is_nonblocking() {
        let (r, w) = pipe().unwrap();
        let mut buf = [0u8; 8];

        let err = read(r, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        assert_eq!(write(w, b"x").unwrap(), 1);
        assert_eq!(read(r, &mut buf).unwrap(), 1);

        close(r).unwrap();
        close(w).unwrap();
    }

    #[test]
    fn nonblocking_mode_can_be_cleared() {
        let (a, b) = socketpair().unwrap();

        set_nonblocking(a, true).unwrap();
        let flags = unsafe { libc::fcntl(a, F_GETFL) };
        assert_ne!(flags & O_NONBLOCK, 0);

        set_nonblocking(a, false).unwrap();
        let flags = unsafe { libc::fcntl(a, F_GETFL) };
        assert_eq!(flags & O_NONBLOCK, 0);

        close(a).unwrap();
        close(b).unwrap();
    }
}
