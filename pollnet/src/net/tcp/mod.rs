//! TCP networking implementation.
//!
//! It is split into:
//! - [`listener`]: accepting incoming TCP connections,
//! - [`stream`]: connected TCP streams.
//!
//! Both are thin wrappers over [`Socket`](crate::Socket) and dereference
//! to it, so reads, writes, deadlines and `close` are the socket's.

pub mod listener;
pub mod stream;
