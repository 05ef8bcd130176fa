mod common;

use common::{init_logger, read_exact, wait_until};
use pollnet::{PollServer, Socket, task};

const PAIRS: usize = 64;

async fn run_pairs(server: &PollServer) {
    let pairs: Vec<_> = (0..PAIRS)
        .map(|_| Socket::pair_on(server).unwrap())
        .collect();

    let readers: Vec<_> = pairs
        .iter()
        .enumerate()
        .map(|(i, (a, _))| {
            let a = a.clone();
            task::spawn(async move {
                let mut buf = [0u8; 2];
                read_exact(&a, &mut buf).await.unwrap();
                assert_eq!(u16::from_le_bytes(buf), i as u16);
            })
        })
        .collect();

    // Every reader is parked on the poll server before anything is sent.
    wait_until(|| pairs.iter().all(|(a, _)| a.stats().read_waits > 0));

    for (i, (_, b)) in pairs.iter().enumerate() {
        b.write_all(&(i as u16).to_le_bytes()).await.unwrap();
    }

    for reader in readers {
        reader.await;
    }
}

#[pollnet::test(worker_threads = 4)]
async fn test_many_concurrent_waiters_are_all_serviced() {
    init_logger();

    let server = PollServer::global().unwrap();
    run_pairs(&server).await;
}

#[pollnet::test(worker_threads = 4)]
async fn test_tiny_request_queue_loses_no_wakeup() {
    init_logger();

    let server = PollServer::builder()
        .request_capacity(1)
        .thread_name("pollnet-tiny-queue")
        .spawn()
        .unwrap();

    run_pairs(&server).await;
    assert!(server.is_running());
}

#[pollnet::test(worker_threads = 8)]
async fn test_ping_pong_rounds_across_pairs() {
    let handles: Vec<_> = (0..32)
        .map(|_| {
            task::spawn(async {
                let (a, b) = Socket::pair().unwrap();

                let echo = task::spawn(async move {
                    let mut buf = [0u8; 8];
                    for _ in 0..50 {
                        read_exact(&b, &mut buf).await.unwrap();
                        b.write_all(&buf).await.unwrap();
                    }
                });

                for round in 0u64..50 {
                    a.write_all(&round.to_le_bytes()).await.unwrap();

                    let mut buf = [0u8; 8];
                    read_exact(&a, &mut buf).await.unwrap();
                    assert_eq!(u64::from_le_bytes(buf), round);
                }

                echo.await;
            })
        })
        .collect();

    for handle in handles {
        handle.await;
    }
}
