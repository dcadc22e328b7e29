//! # CandleMC
//!
//! Protocol core of a Minecraft server: primitive wire codecs, packet framing,
//! versioned packet registries with a cascading lookup cache, and a TCP server
//! that decodes the opening handshake of each connection.
//!
//! ## Modules
//! - [`core`]: identifiers, type codecs and framing
//! - [`protocol`]: connection states, the packet contract, per-version packets
//! - [`registry`]: generic registries, packet registries and their notifications
//! - [`event`]: the notification bus
//! - [`transport`]: accept loop and connection handling
//! - [`config`]: server configuration
//!
//! ## Example
//! ```rust
//! use bytes::BytesMut;
//! use candlemc::core::frame::{decode_frame, MAX_FRAME_SIZE};
//! use candlemc::event::EventBus;
//! use candlemc::protocol::{read_packet, ConnectionState, HandshakePacket, NextState, Packet};
//! use candlemc::transport::ServerContext;
//!
//! let context = ServerContext::new(EventBus::new(1)).unwrap();
//! let codec = context.codec_for(769).unwrap();
//!
//! let handshake = HandshakePacket::new(769, "localhost", 25565, NextState::Login, &codec).unwrap();
//! let mut wire = BytesMut::new();
//! handshake.write_to(&mut wire);
//!
//! let frame = decode_frame(&mut wire, MAX_FRAME_SIZE).unwrap().unwrap();
//! let packet = read_packet(frame, ConnectionState::Handshaking, 769, &context.registries, &codec).unwrap();
//! let decoded = packet.downcast_ref::<HandshakePacket>().unwrap();
//! assert_eq!(decoded.requested_state(), ConnectionState::Login);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
