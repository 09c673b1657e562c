//! Client-side core of the Zerion realtime session protocol
//!
//! The crate keeps a persistent WebSocket session to the game server,
//! predicts local movement ahead of authoritative state, replicates the
//! area-of-interest entity set from incremental diffs, and recovers from
//! connection loss with exponential backoff. Presentation collaborators
//! talk to the core exclusively through the typed event bridge.

pub mod auth;
pub mod config;
pub mod events;
pub mod net;
pub mod predict;
pub mod proto;
pub mod util;
pub mod world;

pub use config::Config;
pub use events::EventBridge;
pub use net::{Connection, ConnectionState, HandshakeError};
