mod common;

use common::init_logger;
use pollnet::Socket;

use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

const PAYLOAD: usize = 4 * 1024 * 1024;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[pollnet::test(worker_threads = 2)]
async fn test_large_write_to_slow_reader_reports_full_count() {
    init_logger();

    let (ours, theirs) = UnixStream::pair().unwrap();
    let socket = Socket::from_fd(OwnedFd::from(ours)).unwrap();

    let reader = thread::spawn(move || {
        let mut theirs = theirs;
        let mut received = Vec::with_capacity(PAYLOAD);
        let mut chunk = [0u8; 16 * 1024];

        loop {
            thread::sleep(Duration::from_micros(200));

            match theirs.read(&mut chunk).unwrap() {
                0 => return received,
                n => received.extend_from_slice(&chunk[..n]),
            }
        }
    });

    let payload = pattern(PAYLOAD);
    let written = socket.write(&payload).await.unwrap();

    assert_eq!(written, PAYLOAD);
    assert!(socket.stats().write_waits > 0);

    socket.close().unwrap();

    let received = reader.join().unwrap();
    assert_eq!(received.len(), PAYLOAD);
    assert!(received == payload);
}

#[pollnet::test(worker_threads = 2)]
async fn test_partial_write_reports_count_and_defers_error() {
    let (a, b) = Socket::pair().unwrap();

    let payload = vec![1u8; PAYLOAD];

    let drained = thread::spawn({
        let b = b.clone();
        move || {
            // Let the writer fill the buffer, then vanish.
            thread::sleep(Duration::from_millis(50));
            b.close().unwrap();
        }
    });

    let first = a.write(&payload).await;
    drained.join().unwrap();

    match first {
        Ok(n) => {
            assert!(n > 0 && n < PAYLOAD);
            assert!(a.write(&payload).await.is_err());
        }
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
    }
}
