mod common;

use common::{init_logger, wait_until};
use pollnet::Socket;
use pollnet::task;

use std::io;
use std::time::{Duration, Instant};

#[pollnet::test(worker_threads = 2)]
async fn test_close_unblocks_a_blocked_reader() {
    init_logger();

    let (a, _b) = Socket::pair().unwrap();

    let reader = a.clone();
    let blocked = task::spawn(async move {
        let mut buf = [0u8; 16];
        let result = reader.read(&mut buf).await;
        (result, Instant::now())
    });

    wait_until(|| a.stats().read_waits > 0);

    let closed_at = Instant::now();
    a.close().unwrap();

    let (result, returned_at) = blocked.await;

    match result {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidInput),
    }
    assert!(returned_at.duration_since(closed_at) < Duration::from_secs(1));
}

#[pollnet::test(worker_threads = 2)]
async fn test_close_unblocks_a_blocked_writer() {
    let (a, _b) = Socket::pair().unwrap();

    let writer = a.clone();
    let blocked = task::spawn(async move {
        let payload = vec![0u8; 16 * 1024 * 1024];
        writer.write_all(&payload).await
    });

    wait_until(|| a.stats().write_waits > 0);
    a.close().unwrap();

    let err = blocked.await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn test_double_close() {
    let (a, b) = Socket::pair().unwrap();

    a.close().unwrap();
    assert_eq!(a.close().unwrap_err().kind(), io::ErrorKind::InvalidInput);

    let clone = b.clone();
    b.close().unwrap();
    assert!(clone.is_closed());
    assert_eq!(clone.close().unwrap_err().kind(), io::ErrorKind::InvalidInput);
}

#[pollnet::test]
async fn test_operations_on_a_closed_socket_fail() {
    let (a, _b) = Socket::pair().unwrap();
    a.close().unwrap();

    let kind = |r: io::Result<usize>| r.unwrap_err().kind();

    assert_eq!(kind(a.read(&mut [0u8; 1]).await), io::ErrorKind::InvalidInput);
    assert_eq!(kind(a.write(b"x").await), io::ErrorKind::InvalidInput);
    assert_eq!(
        a.shutdown(std::net::Shutdown::Both).unwrap_err().kind(),
        io::ErrorKind::InvalidInput
    );
}

#[pollnet::test]
async fn test_peer_sees_end_of_stream_after_close() {
    let (a, b) = Socket::pair().unwrap();

    a.write_all(b"last words").await.unwrap();
    a.close().unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        match b.read(&mut buf).await.unwrap() {
            0 => break,
            n => received.extend_from_slice(&buf[..n]),
        }
    }

    assert_eq!(received, b"last words");
}

#[pollnet::test]
async fn test_shutdown_write_half() {
    let (a, b) = Socket::pair().unwrap();

    a.shutdown(std::net::Shutdown::Write).unwrap();
    assert_eq!(b.read(&mut [0u8; 4]).await.unwrap(), 0);

    b.write_all(b"still open").await.unwrap();
    let mut buf = [0u8; 10];
    common::read_exact(&a, &mut buf).await.unwrap();
    assert_eq!(&buf, b"still open");
}
