//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Start a programmable RESP server on an ephemeral port.
///
/// `f` receives each command's arguments and returns the raw reply
/// (including the trailing CRLF).
#[allow(dead_code)]
pub async fn start_mock_redis<F>(f: F) -> SocketAddr
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut socket = BufReader::new(socket);
                        while let Some(args) = read_command(&mut socket).await {
                            let reply = f(&args);
                            if socket.get_mut().write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_command(socket: &mut BufReader<tokio::net::TcpStream>) -> Option<Vec<String>> {
    let mut header = String::new();
    if socket.read_line(&mut header).await.ok()? == 0 {
        return None;
    }
    let count: usize = header.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len = String::new();
        socket.read_line(&mut len).await.ok()?;
        let mut arg = String::new();
        socket.read_line(&mut arg).await.ok()?;
        args.push(arg.trim_end().to_string());
    }
    Some(args)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
