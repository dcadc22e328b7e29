//! Decoded packets, packet keys and the frame-to-packet resolution step.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::codec::DataCodec;
use crate::core::frame::{write_frame, RawFrame};
use crate::core::types::varint_len;
use crate::error::{ProtocolError, Result};
use crate::protocol::state::ConnectionState;
use crate::registry::registries::PacketRegistries;

/// Identifies one packet type within a protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketKey {
    pub state: ConnectionState,
    pub id: u8,
}

impl PacketKey {
    pub const fn new(state: ConnectionState, id: u8) -> Self {
        Self { state, id }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/0x{:02x}", self.state, self.id)
    }
}

/// A packet read off the wire.
pub trait Packet: fmt::Debug + Send + Sync + Any {
    fn id(&self) -> u8;

    /// Raw payload bytes (everything after the packet id).
    fn payload(&self) -> &Bytes;

    /// State the packet was read under.
    fn connection_state(&self) -> ConnectionState;

    fn as_any(&self) -> &dyn Any;

    /// Value of the frame's length prefix: `size(VarInt(id)) + len(payload)`.
    fn length(&self) -> usize {
        varint_len(i32::from(self.id())) + self.payload().len()
    }

    /// Append this packet as a complete frame.
    fn write_to(&self, buf: &mut BytesMut) {
        write_frame(buf, i32::from(self.id()), self.payload());
    }
}

impl dyn Packet {
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Builds a typed packet from `(packet id, payload length, payload, codec)`.
///
/// Factories hold no state, so one factory may decode many frames concurrently.
pub type PacketFactory =
    Arc<dyn Fn(u8, usize, Bytes, &DataCodec) -> Result<Box<dyn Packet>> + Send + Sync>;

/// A packet kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: u8,
    pub payload: Bytes,
    pub state: ConnectionState,
}

impl RawPacket {
    /// Factory that keeps payloads undecoded, for packets with no typed form yet.
    pub fn factory(state: ConnectionState) -> PacketFactory {
        Arc::new(move |id: u8, _len: usize, payload: Bytes, _codec: &DataCodec| {
            Ok(Box::new(RawPacket { id, payload, state }) as Box<dyn Packet>)
        })
    }
}

impl Packet for RawPacket {
    fn id(&self) -> u8 {
        self.id
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolve `frame` through the registry for `protocol_version` and decode it.
///
/// The wire id is truncated to 8 bits before lookup.
///
/// # Errors
/// - [`ProtocolError::UnknownProtocolVersion`] if no registry serves the version
/// - [`ProtocolError::UnknownPacket`] if the registry has no factory for the key
/// - any error raised by the factory while decoding the payload
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn read_packet(
    frame: RawFrame,
    state: ConnectionState,
    protocol_version: i32,
    registries: &PacketRegistries,
    codec: &DataCodec,
) -> Result<Box<dyn Packet>> {
    let registry = registries
        .by_protocol_version(protocol_version)
        .ok_or(ProtocolError::UnknownProtocolVersion(protocol_version))?;

    let key = PacketKey::new(state, frame.id as u8);
    let factory = registry
        .resolve_factory(&key)
        .ok_or(ProtocolError::UnknownPacket(key))?;

    debug!(%key, protocol_version, len = frame.payload.len(), "Decoding packet");
    factory(key.id, frame.payload.len(), frame.payload, codec)
}
