//! Example: TCP echo server with idle timeouts
//!
//! Run it, then `nc 127.0.0.1 9000`. Connections idle for more than
//! ten seconds are closed.

use pollnet::net::{TcpListener, TcpStream};
use pollnet::task;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

#[pollnet::main(worker_threads = 4)]
async fn main() {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:9000").unwrap();
    println!("Echo server listening on 127.0.0.1:9000");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                println!("accept failed: {err}");
                continue;
            }
        };
        println!("Accepted connection from {peer}");

        task::spawn(handle_client(stream, peer));
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr) {
    stream.set_read_timeout(Some(Duration::from_secs(10)));

    let mut buf = [0u8; 1024];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                println!("{peer} idle, closing");
                break;
            }
            Err(err) => {
                println!("{peer}: {err}");
                break;
            }
        };

        if stream.write_all(&buf[..n]).await.is_err() {
            break;
        }
    }

    let _ = stream.close();
}
