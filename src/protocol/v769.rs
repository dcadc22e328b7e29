//! Protocol 769 (Minecraft 1.21.4).

use std::sync::Arc;

use tracing::debug;

use crate::core::codec::DataCodec;
use crate::core::types::{LongCodec, StringCodec, UnsignedShortCodec, UuidCodec, VarIntCodec};
use crate::error::Result;
use crate::event::EventBus;
use crate::protocol::handshake::{self, HandshakePacket};
use crate::registry::packet_registry::PacketRegistry;

pub const PROTOCOL_VERSION: i32 = 769;

/// Type codec catalog `candlemc:codec/769`.
pub fn data_codec(bus: EventBus) -> Result<DataCodec> {
    let codec = DataCodec::for_version(PROTOCOL_VERSION, bus);
    codec.register(VarIntCodec)?;
    codec.register(StringCodec)?;
    codec.register(UnsignedShortCodec)?;
    codec.register(LongCodec)?;
    codec.register(UuidCodec)?;
    debug!(codec = %codec.identifier(), "Registered primitive codecs");
    Ok(codec)
}

/// Root packet registry for 769, with its lookup cache already generated.
pub fn packet_registry(bus: EventBus) -> Result<Arc<PacketRegistry>> {
    let registry = PacketRegistry::new(PROTOCOL_VERSION, bus);
    registry.register_packet(handshake::KEY, HandshakePacket::factory())?;
    registry.pre_generate_cache();
    Ok(registry)
}
