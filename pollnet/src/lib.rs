//! # pollnet
//!
//! **pollnet** is a non-blocking socket layer for Rust. Many tasks can
//! perform reads, writes and accepts that look blocking, on non-blocking
//! descriptors, without each of them occupying an OS thread.
//!
//! It is made of:
//!
//! - a [`Socket`] handle owning one descriptor, with per-direction
//!   serialization, timeouts and absolute deadlines,
//! - a single background **poll server** ([`PollServer`]) that waits on
//!   every socket's readiness through one OS poller (`epoll` on Linux,
//!   `poll(2)` elsewhere) and enforces deadlines without per-socket timers,
//! - a small multi-threaded task runtime ([`Runtime`]) to run the tasks
//!   using those sockets,
//! - [`net::TcpListener`] and [`net::TcpStream`] convenience wrappers.
//!
//! The process-wide poll server starts on first use.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pollnet::net::TcpListener;
//!
//! #[pollnet::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080")?;
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!
//!         pollnet::task::spawn(async move {
//!             let mut buf = [0u8; 1024];
//!
//!             while let Ok(n @ 1..) = stream.read(&mut buf).await {
//!                 if stream.write_all(&buf[..n]).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! ## Errors
//!
//! Every fallible operation returns [`std::io::Result`]; see [`error`]
//! for the kinds callers are expected to handle.

extern crate self as pollnet;

mod poller;
mod runtime;
mod server;
mod socket;
mod sys;

pub mod error;
pub mod net;

pub use error::PollServerError;
pub use poller::{Direction, Poller};
pub use runtime::builder::RuntimeBuilder;
pub use runtime::task;
pub use runtime::Runtime;
pub use server::{PollServer, PollServerBuilder};
pub use socket::{Socket, SocketStats};
pub use sys::fork_lock;

pub use pollnet_macros::*;
