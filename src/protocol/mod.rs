//! # Protocol Layer
//!
//! Connection states, the packet contract and the packets of each supported
//! protocol version.
//!
//! ## Components
//! - **State**: [`state::ConnectionState`], the phase that selects a packet catalog
//! - **Packet**: [`packet::Packet`], [`packet::PacketKey`] and [`packet::read_packet`]
//! - **Handshake**: the first packet of every connection
//! - **v769**: codec catalog and packet registry for protocol 769
//!
//! ## Handshake Flow
//! ```text
//! Client                              Server
//!   |                                    |
//!   |-- Handshake (Handshaking/0x00) --->|
//!   |   version, address, port, next     |
//!   |                                    |
//!   |        Status / Login / Transfer   |
//! ```

pub mod handshake;
pub mod packet;
pub mod state;
pub mod v769;

pub use handshake::{HandshakePacket, NextState};
pub use packet::{read_packet, Packet, PacketFactory, PacketKey, RawPacket};
pub use state::ConnectionState;
