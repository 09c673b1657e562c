//! Wire protocol message definitions
//! These are the MessagePack wire types exchanged with the game server

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::util::time::unix_millis;

/// Protocol version carried in every envelope
pub const PROTOCOL_VERSION: u8 = 1;

/// Sub-protocol tag advertised during the WebSocket handshake
pub const WS_PROTOCOL: &str = "zerion.v1";

/// Operation kinds; every message is self-describing through this field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Hello,
    Ping,
    Move,
    Chat,
    State,
    Event,
    Warn,
    Resync,
}

/// The common wire wrapper around every protocol message
///
/// `seq` is assigned by the sender and increases per connection lifetime;
/// `ack` never decreases within a connection. Unknown fields on inbound
/// envelopes are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version, currently always 1
    pub v: u8,
    /// Operation kind
    pub op: Op,
    /// Input sequence number (client-originated inputs only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Highest input sequence the server has applied (state messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    /// Send timestamp in Unix milliseconds
    pub ts: u64,
    /// Typed payload; absence is legal (e.g. ping)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<rmpv::Value>,
}

impl Envelope {
    /// Build a payload-less envelope stamped with the current time
    pub fn new(op: Op) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            op,
            seq: None,
            ack: None,
            ts: unix_millis(),
            payload: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_ack(mut self, ack: u64) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Attach a typed payload
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Result<Self, EncodeError> {
        self.payload = Some(rmpv::ext::to_value(payload)?);
        Ok(self)
    }

    /// Decode the payload into a typed shape; unknown payload fields are
    /// ignored
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let value = self.payload.clone().unwrap_or(rmpv::Value::Nil);
        Ok(rmpv::ext::from_value(value)?)
    }
}

/// Serialize an envelope to its wire bytes (structs as named maps)
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EncodeError> {
    Ok(rmp_serde::to_vec_named(envelope)?)
}

/// Decode an inbound frame into an envelope
pub fn decode(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Handshake info sent by the server right after accepting the connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Server simulation rate in ticks per second
    pub tick_hz: u32,
    /// Server wall-clock time at handshake, Unix milliseconds
    pub server_time_ms: u64,
}

/// A single discrete movement step (not a velocity)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovePayload {
    pub dx: f64,
    pub dy: f64,
}

/// Outbound chat line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub channel: String,
    pub msg: String,
}

/// Server event; the kind is inferred from which fields are populated
///
/// A populated `channel` marks a chat broadcast; a populated `code` marks
/// an error report; other shapes are reserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A replicated world object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier, unique within a session
    pub id: String,
    /// Kind tag (e.g. "player", "npc")
    pub kind: String,
    pub x: f64,
    pub y: f64,
    /// Health points
    pub hp: i32,
    /// Open-ended metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, rmpv::Value>,
}

/// Partial field patch applied to an existing entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPatch {
    pub id: String,
    pub patch: EntityFields,
}

/// All-optional entity fields; absent fields are left untouched on merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, rmpv::Value>>,
}

/// Authoritative view of the local player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub x: f64,
    pub y: f64,
    pub hp: i32,
    pub mp: i32,
}

/// Authoritative snapshot: local player plus either a full entity list or
/// incremental area-of-interest diff lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub you: PlayerState,
    /// Full entity list (resync); replaces the replica when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    /// Entities that entered the area of interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added: Option<Vec<Entity>>,
    /// Partial patches for entities already in the area of interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<EntityPatch>>,
    /// Identifiers of entities that left the area of interest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
}

/// Outbound serialization failure; the message is dropped by the caller
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to serialize envelope: {0}")]
    Envelope(#[from] rmp_serde::encode::Error),

    #[error("Failed to serialize payload: {0}")]
    Payload(#[from] rmpv::ext::Error),
}

/// Malformed inbound frame; recovered locally by discarding the frame
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Frame(#[from] rmp_serde::decode::Error),

    #[error("Malformed payload: {0}")]
    Payload(#[from] rmpv::ext::Error),
}
