//! Engine connectors used by the standard database probe.
//!
//! # Data Flow
//! ```text
//! TargetConfig (engine, address)
//!     → tcp.rs   (connect, socket liveness)
//!     → redis.rs (connect, AUTH, PING, SET)
//!     → DatabaseProbe registers Client/Ping/Write failures
//! ```
//!
//! # Design Decisions
//! - One short-lived connection per probe; nothing is pooled
//! - Connectors are cheap to clone and own only the target address

pub mod redis;
pub mod tcp;

pub use redis::{RedisClient, RedisConnector};
pub use tcp::{TcpClient, TcpConnector};
