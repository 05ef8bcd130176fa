//! TCP networking primitives.
//!
//! [`TcpListener`] and [`TcpStream`] are sockets created from literal
//! addresses and attached to a poll server. Address resolution is not
//! performed.

pub mod tcp;

pub use tcp::listener::TcpListener;
pub use tcp::stream::TcpStream;
