mod common;

use common::{init_logger, read_exact};
use pollnet::Socket;
use pollnet::error::is_timeout;
use pollnet::net::{TcpListener, TcpStream};
use pollnet::task;

use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

const SINGLE_BYTE_WRITES: usize = 2000;

#[pollnet::test(worker_threads = 4)]
async fn test_single_byte_writes_then_close_drain_exactly() {
    init_logger();

    let (reader, writer) = Socket::pair().unwrap();

    let producer = task::spawn(async move {
        for i in 0..SINGLE_BYTE_WRITES {
            assert_eq!(writer.write(&[i as u8]).await.unwrap(), 1);
        }

        writer.close().unwrap();
    });

    let mut received = Vec::new();
    let mut buf = [0u8; 64];

    loop {
        let n = reader.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }

    producer.await;

    assert_eq!(received.len(), SINGLE_BYTE_WRITES);
    for (i, byte) in received.iter().enumerate() {
        assert_eq!(*byte, i as u8);
    }
}

#[pollnet::test(worker_threads = 2)]
async fn test_zero_length_read_at_end_of_stream() {
    let (a, b) = Socket::pair().unwrap();

    b.write_all(b"bye").await.unwrap();
    drop(b);

    let mut buf = [0u8; 3];
    read_exact(&a, &mut buf).await.unwrap();
    assert_eq!(&buf, b"bye");

    assert_eq!(a.read(&mut buf).await.unwrap(), 0);
    assert_eq!(a.read(&mut buf).await.unwrap(), 0);
}

#[pollnet::test(worker_threads = 4)]
async fn test_tcp_ping_pong() {
    init_logger();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = task::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), peer);

        for _ in 0..3 {
            let mut buf = [0u8; 4];
            read_exact(&stream, &mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            stream.write_all(b"pong").await.unwrap();
        }
    });

    let stream = TcpStream::connect(&addr.to_string()).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap(), addr);
    assert!(stream.local_addr().unwrap().port() != 0);

    for _ in 0..3 {
        stream.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 4];
        read_exact(&stream, &mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    server.await;
}

#[pollnet::test(worker_threads = 2)]
async fn test_full_duplex_on_one_socket() {
    let (a, b) = Socket::pair().unwrap();

    let reader = a.clone();
    let read_side = task::spawn(async move {
        let mut buf = [0u8; 5];
        read_exact(&reader, &mut buf).await.unwrap();
        buf
    });

    // Writing on `a` must not wait for the read in progress on `a`.
    a.write_all(b"out").await.unwrap();

    let mut buf = [0u8; 3];
    read_exact(&b, &mut buf).await.unwrap();
    assert_eq!(&buf, b"out");

    b.write_all(b"hello").await.unwrap();
    assert_eq!(&read_side.await, b"hello");
}

#[pollnet::test]
async fn test_connect_refused() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let err = TcpStream::connect(&addr.to_string()).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
}

#[pollnet::test]
async fn test_host_names_are_not_resolved() {
    let err = TcpListener::bind("localhost:0").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

    let err = TcpStream::connect("localhost:80").await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

/// A listener whose accept queue is full, so the kernel drops further
/// connection attempts instead of completing them.
fn saturated_listener() -> (std::net::TcpListener, Vec<std::net::TcpStream>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    assert_eq!(unsafe { libc::listen(listener.as_raw_fd(), 0) }, 0);

    let addr = listener.local_addr().unwrap();
    let mut queued = Vec::new();

    while queued.len() < 16 {
        match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => queued.push(stream),
            Err(_) => break,
        }
    }

    assert!(queued.len() < 16, "accept queue never filled up");
    (listener, queued)
}

#[pollnet::test]
async fn test_connect_timeout_expires_against_a_stalled_listener() {
    init_logger();

    let (listener, _queued) = saturated_listener();
    let addr = listener.local_addr().unwrap().to_string();
    let timeout = Duration::from_millis(100);

    let start = Instant::now();
    let err = TcpStream::connect_timeout(&addr, timeout).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(is_timeout(&err), "unexpected error: {err}");
    assert!(elapsed >= timeout, "timed out early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "timed out late: {elapsed:?}");
}

#[pollnet::test]
async fn test_connect_timeout_reaches_a_live_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(5))
        .await
        .unwrap();

    // The timeout only bounds the handshake.
    assert_eq!(stream.write_timeout(), None);

    let (_accepted, peer) = listener.accept().await.unwrap();
    assert_eq!(peer, stream.local_addr().unwrap());
}
