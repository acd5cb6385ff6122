//! Redis / Valkey probe over RESP.
//!
//! # Responsibilities
//! - Connect and authenticate
//! - `PING` must answer `+PONG`
//! - `SET` a marker key must answer `+OK` (fails on read-only replicas)

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::health::probe::{ClientError, Connector, DatabaseClient};

/// Key written by the write check.
pub const HEALTH_CHECK_KEY: &str = "kubedb:health-check";

/// Longest reply line accepted from the server.
const MAX_LINE: u64 = 4096;

/// Opens authenticated RESP connections.
#[derive(Clone)]
pub struct RedisConnector {
    address: String,
    password: Option<String>,
}

impl RedisConnector {
    pub fn new(address: impl Into<String>, password: Option<String>) -> Self {
        Self {
            address: address.into(),
            password,
        }
    }
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnector")
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Connector for RedisConnector {
    type Client = RedisClient<TcpStream>;

    async fn connect(&self) -> Result<Self::Client, ClientError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let mut client = RedisClient::new(stream);
        if let Some(password) = &self.password {
            client.auth(password).await?;
        }
        Ok(client)
    }
}

/// A RESP connection.
#[derive(Debug)]
pub struct RedisClient<S> {
    stream: BufReader<S>,
}

impl<S> RedisClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    pub async fn auth(&mut self, password: &str) -> Result<(), ClientError> {
        self.expect(&["AUTH", password], "+OK").await
    }

    /// Send one command and return its reply line without the trailing CRLF.
    pub async fn command(&mut self, args: &[&str]) -> Result<String, ClientError> {
        let stream = self.stream.get_mut();
        stream.write_all(&encode(args)).await?;
        stream.flush().await?;
        self.read_line().await
    }

    async fn expect(&mut self, args: &[&str], expected: &str) -> Result<(), ClientError> {
        let reply = self.command(args).await?;
        if reply == expected {
            Ok(())
        } else {
            Err(ClientError::Unexpected {
                expected: expected.to_string(),
                actual: reply,
            })
        }
    }

    async fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = String::new();
        let n = (&mut self.stream).take(MAX_LINE).read_line(&mut line).await?;
        if n == 0 {
            return Err(ClientError::Protocol("connection closed by server".into()));
        }
        if !line.ends_with("\r\n") {
            return Err(ClientError::Protocol(format!(
                "reply is not CRLF terminated: {:?}",
                line
            )));
        }
        line.truncate(line.len() - 2);
        Ok(line)
    }
}

impl<S> DatabaseClient for RedisClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn ping(&mut self) -> Result<(), ClientError> {
        self.expect(&["PING"], "+PONG").await
    }

    async fn write_check(&mut self) -> Result<(), ClientError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        self.expect(&["SET", HEALTH_CHECK_KEY, &now], "+OK").await
    }

    async fn close(mut self) {
        let _ = self.stream.get_mut().shutdown().await;
    }
}

/// Encode a command as a RESP array of bulk strings.
fn encode(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}
