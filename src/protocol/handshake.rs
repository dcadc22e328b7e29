//! Handshake packet definitions.
//!
//! The handshake is the first packet sent by the client and determines
//! which state the connection moves to next.
//!
//! ## Payload
//! ```text
//! [VarInt protocol version] [String server address] [UnsignedShort server port] [VarInt next state]
//! ```

use std::any::Any;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::core::codec::DataCodec;
use crate::core::types::{STRING, UNSIGNED_SHORT, VAR_INT};
use crate::error::{ProtocolError, Result};
use crate::protocol::packet::{Packet, PacketFactory, PacketKey};
use crate::protocol::state::ConnectionState;

/// Handshake packet ID.
pub const PACKET_ID: u8 = 0x00;

/// Registry key of the handshake packet.
pub const KEY: PacketKey = PacketKey::new(ConnectionState::Handshaking, PACKET_ID);

/// State a client may ask for at the end of the handshake.
///
/// Handshaking, Configuration and Play cannot be requested directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextState {
    /// Status request (server list ping).
    Status = 1,
    /// Login request.
    Login = 2,
    /// Transfer (1.20.5+).
    Transfer = 3,
}

impl NextState {
    pub const fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for NextState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            1 => Ok(Self::Status),
            2 => Ok(Self::Login),
            3 => Ok(Self::Transfer),
            _ => Err(ProtocolError::UnsupportedConnectionState(value)),
        }
    }
}

impl From<NextState> for ConnectionState {
    fn from(next: NextState) -> Self {
        match next {
            NextState::Status => ConnectionState::Status,
            NextState::Login => ConnectionState::Login,
            NextState::Transfer => ConnectionState::Transfer,
        }
    }
}

/// Handshake packet sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    /// The protocol version the client is using.
    pub protocol_version: i32,
    /// The server address the client connected to.
    pub server_address: String,
    /// The server port the client connected to.
    pub server_port: u16,
    /// The state the client wants to switch to.
    pub next_state: NextState,
    payload: Bytes,
}

impl HandshakePacket {
    /// Build a handshake and encode its payload with `codec`.
    pub fn new(
        protocol_version: i32,
        server_address: impl Into<String>,
        server_port: u16,
        next_state: NextState,
        codec: &DataCodec,
    ) -> Result<Self> {
        let mut packet = Self {
            protocol_version,
            server_address: server_address.into(),
            server_port,
            next_state,
            payload: Bytes::new(),
        };
        packet.payload = packet.to_payload(codec)?;
        Ok(packet)
    }

    /// Decode a handshake from its payload.
    pub fn decode(mut payload: Bytes, codec: &DataCodec) -> Result<Self> {
        let raw = payload.clone();

        let protocol_version = codec.read_type(&mut payload, &VAR_INT)?;
        let server_address = codec.read_type(&mut payload, &STRING)?;
        let server_port = codec.read_type(&mut payload, &UNSIGNED_SHORT)?;
        let next_state = NextState::try_from(codec.read_type(&mut payload, &VAR_INT)?)?;

        Ok(Self {
            protocol_version,
            server_address,
            server_port,
            next_state,
            payload: raw,
        })
    }

    /// Serialise the fields, in wire order.
    pub fn to_payload(&self, codec: &DataCodec) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        codec.write_type(&mut buf, &VAR_INT, &self.protocol_version)?;
        codec.write_type(&mut buf, &STRING, &self.server_address)?;
        codec.write_type(&mut buf, &UNSIGNED_SHORT, &self.server_port)?;
        codec.write_type(&mut buf, &VAR_INT, &self.next_state.code())?;
        Ok(buf.freeze())
    }

    /// The connection state requested by the client.
    pub fn requested_state(&self) -> ConnectionState {
        self.next_state.into()
    }

    /// Registry factory for `(Handshaking, 0x00)`.
    pub fn factory() -> PacketFactory {
        Arc::new(|_id: u8, _len: usize, payload: Bytes, codec: &DataCodec| {
            Ok(Box::new(HandshakePacket::decode(payload, codec)?) as Box<dyn Packet>)
        })
    }
}

impl Packet for HandshakePacket {
    fn id(&self) -> u8 {
        PACKET_ID
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Handshaking
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::protocol::v769;

    #[test]
    fn test_handshake_roundtrip() {
        let codec = v769::data_codec(EventBus::new(1)).unwrap();
        let original = HandshakePacket::new(769, "localhost", 25565, NextState::Status, &codec)
            .unwrap();

        let parsed = HandshakePacket::decode(original.payload().clone(), &codec).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.requested_state(), ConnectionState::Status);
    }

    #[test]
    fn test_payload_bytes() {
        let codec = v769::data_codec(EventBus::new(1)).unwrap();
        let packet = HandshakePacket::new(769, "a", 25565, NextState::Login, &codec).unwrap();
        // 769 = 0x81 0x06, "a" = 0x01 'a', 25565 = 0x63 0xdd, Login = 0x02
        assert_eq!(
            &packet.payload()[..],
            &[0x81, 0x06, 0x01, b'a', 0x63, 0xdd, 0x02]
        );
        assert_eq!(packet.length(), 8);
    }

    #[test]
    fn test_next_state_conversion() {
        assert_eq!(NextState::try_from(1).unwrap(), NextState::Status);
        assert_eq!(NextState::try_from(2).unwrap(), NextState::Login);
        assert_eq!(NextState::try_from(3).unwrap(), NextState::Transfer);
        assert!(matches!(
            NextState::try_from(0),
            Err(ProtocolError::UnsupportedConnectionState(0))
        ));
        assert!(NextState::try_from(4).is_err());
    }

    #[test]
    fn test_unsupported_next_state_in_payload() {
        let codec = v769::data_codec(EventBus::new(1)).unwrap();
        let mut payload = BytesMut::from(
            &HandshakePacket::new(769, "a", 1, NextState::Login, &codec)
                .unwrap()
                .payload()[..],
        );
        let last = payload.len() - 1;
        payload[last] = 0x05;

        assert!(matches!(
            HandshakePacket::decode(payload.freeze(), &codec),
            Err(ProtocolError::UnsupportedConnectionState(5))
        ));
    }
}
