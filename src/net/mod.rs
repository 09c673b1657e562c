//! Connection management for the realtime session

pub mod backoff;
pub mod connection;

pub use backoff::Backoff;
pub use connection::{Connection, ConnectionState, HandshakeError};
