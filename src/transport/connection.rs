//! Per-connection handling: read the handshake, report it, close.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{info, instrument, warn};

use crate::core::frame::{FrameCodec, RawFrame};
use crate::error::{constants, ProtocolError, Result};
use crate::event::{partition_of, Event};
use crate::protocol::handshake::HandshakePacket;
use crate::protocol::packet::{read_packet, Packet};
use crate::protocol::state::ConnectionState;
use crate::transport::server::ServerContext;

/// Published for every packet a connection decodes.
#[derive(Debug, Clone)]
pub struct PacketDecoded {
    pub peer: SocketAddr,
    pub protocol_version: i32,
    pub packet: Arc<dyn Packet>,
}

impl Event for PacketDecoded {
    fn partition(&self) -> u64 {
        partition_of(&self.peer)
    }
}

/// Read one frame from `stream` and decode it in the Handshaking state.
pub async fn read_handshake<S>(stream: S, context: &ServerContext) -> Result<Box<dyn Packet>>
where
    S: AsyncRead + Unpin,
{
    let codec = context
        .codec_for(context.protocol_version)
        .ok_or(ProtocolError::UnknownProtocolVersion(context.protocol_version))?;

    let mut framed = FramedRead::new(stream, FrameCodec::new(context.max_packet_size));
    let frame: RawFrame = framed
        .next()
        .await
        .ok_or(ProtocolError::UnexpectedEof(constants::EOF_PACKET))??;

    read_packet(
        frame,
        ConnectionState::Handshaking,
        context.protocol_version,
        &context.registries,
        &codec,
    )
}

/// Serve one accepted connection. Errors end this connection only.
#[instrument(skip_all, fields(peer = %peer))]
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, context: Arc<ServerContext>)
where
    S: AsyncRead + Unpin,
{
    let packet = match read_handshake(stream, &context).await {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, "Connection failed");
            return;
        }
    };

    match packet.downcast_ref::<HandshakePacket>() {
        Some(handshake) => info!(
            protocol_version = handshake.protocol_version,
            server_address = %handshake.server_address,
            server_port = handshake.server_port,
            next_state = %handshake.requested_state(),
            "Received handshake"
        ),
        None => info!(id = packet.id(), len = packet.length(), "Received packet"),
    }

    context.bus.publish(PacketDecoded {
        peer,
        protocol_version: context.protocol_version,
        packet: Arc::from(packet),
    });

    info!("Closing connection");
}
