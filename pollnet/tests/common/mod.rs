#![allow(dead_code)]

use pollnet::Socket;

use std::io;
use std::time::{Duration, Instant};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Reads until `buf` is full, failing on a premature end of stream.
pub async fn read_exact(socket: &Socket, mut buf: &mut [u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match socket.read(buf).await? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            n => buf = &mut buf[n..],
        }
    }

    Ok(())
}

/// Blocks the current worker until `condition` holds, or panics after
/// five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = Instant::now();

    while !condition() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "condition not reached in time"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
