//! Example: TCP client with a connect timeout
//!
//! Talks to the `echo_server` example.

use pollnet::net::TcpStream;

use std::time::Duration;

#[pollnet::main]
async fn main() {
    let stream = match TcpStream::connect_timeout("127.0.0.1:9000", Duration::from_secs(2)).await {
        Ok(stream) => stream,
        Err(e) => {
            println!("Failed to connect: {}", e);
            return;
        }
    };

    let msg = b"Hello from client!";
    stream.write_all(msg).await.unwrap();
    println!("Sent: {}", String::from_utf8_lossy(msg));

    stream.set_read_timeout(Some(Duration::from_secs(2)));

    let mut buf = [0u8; 64];
    match stream.read(&mut buf).await {
        Ok(n) => println!("Received: {}", String::from_utf8_lossy(&buf[..n])),
        Err(e) => println!("No echo: {}", e),
    }
}
