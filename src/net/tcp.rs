//! Plain TCP reachability probe.

use std::io::ErrorKind;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::health::probe::{ClientError, Connector, DatabaseClient};

/// Opens a TCP connection to `address`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Connector for TcpConnector {
    type Client = TcpClient;

    async fn connect(&self) -> Result<TcpClient, ClientError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(TcpClient { stream })
    }
}

/// Connected socket. Ping checks the socket is error free and not closed by
/// the peer; there is nothing to write.
#[derive(Debug)]
pub struct TcpClient {
    stream: TcpStream,
}

impl DatabaseClient for TcpClient {
    async fn ping(&mut self) -> Result<(), ClientError> {
        if let Some(err) = self.stream.take_error()? {
            return Err(err.into());
        }
        self.stream.peer_addr()?;

        let mut buf = [0u8; 1];
        match self.stream.try_read(&mut buf) {
            Ok(0) => Err(ClientError::Protocol("connection closed by peer".into())),
            // greeting (MySQL, Postgres notices); the server is talking to us
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_check(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_ping_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = TcpConnector::new(addr.to_string());
        let mut client = connector.connect().await.unwrap();
        let _server_side = accept.await.unwrap();

        client.ping().await.unwrap();
        client.write_check().await.unwrap();
        client.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpConnector::new(addr.to_string()).connect().await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }

    #[tokio::test]
    async fn test_ping_detects_closed_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut client = TcpConnector::new(addr.to_string()).connect().await.unwrap();
        let (server_side, _) = accept.await.unwrap();
        drop(server_side);

        client.stream.readable().await.unwrap();
        assert!(client.ping().await.is_err());
    }
}
