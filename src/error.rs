//! # Error Types
//!
//! Error handling for the protocol core.
//!
//! ## Error Categories
//! - **Malformed input**: truncated streams, oversized VarInts, degenerate UUIDs.
//!   Fatal to the decode in progress and to the connection that produced it.
//! - **Unknown keys**: no codec for a type identifier, no packet factory for a key,
//!   no registry for a protocol version. These indicate a version mismatch and are
//!   never retried.
//! - **Registry misuse**: duplicate registration, parent cycles, invalid identifiers.
//! - **Persistence**: cache (de)serialization and signature mismatches. These are
//!   reported through notifications, never returned from the save/load calls.
//! - **Transport / configuration**: socket I/O and config parsing.
//!
//! ## Example Usage
//! ```rust
//! use candlemc::core::types::{read_varint, write_varint};
//! use candlemc::error::ProtocolError;
//! use bytes::{Bytes, BytesMut};
//!
//! let mut buf = BytesMut::new();
//! write_varint(&mut buf, 25565);
//! let mut bytes = buf.freeze();
//! assert_eq!(read_varint(&mut bytes).unwrap(), 25565);
//!
//! let mut truncated = Bytes::from_static(&[0x80]);
//! assert!(matches!(read_varint(&mut truncated), Err(ProtocolError::UnexpectedEof(_))));
//! ```

use std::io;
use thiserror::Error;

use crate::core::identifier::Identifier;
use crate::protocol::packet::PacketKey;

/// Static error messages shared between the error paths and the tests.
pub mod constants {
    /// Stream exhaustion messages
    pub const EOF_VARINT: &str = "VarInt";
    pub const EOF_STRING: &str = "String";
    pub const EOF_UNSIGNED_SHORT: &str = "unsigned short";
    pub const EOF_LONG: &str = "Long";
    pub const EOF_UUID: &str = "UUID";
    pub const EOF_PACKET: &str = "packet";
}

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("VarInt too long")]
    VarIntTooLong,

    #[error("Stream ended while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("Invalid UUID data: most and least significant bits are identical")]
    IdenticalUuidHalves,

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("Negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("Packet too long: {len} bytes (max {max})")]
    PacketTooLong { len: usize, max: usize },

    #[error("No codec registered with identifier: {0}")]
    CodecNotRegistered(Identifier),

    #[error("Codec registered under {0} does not produce the requested type")]
    CodecTypeMismatch(Identifier),

    #[error("No packet registry for protocol version {0}")]
    UnknownProtocolVersion(i32),

    #[error("No registered packet for key {0}")]
    UnknownPacket(PacketKey),

    #[error("Unsupported connection state: {0}")]
    UnsupportedConnectionState(i32),

    #[error("Packet already registered: {0}")]
    DuplicatePacket(PacketKey),

    #[error("ID already registered: {0}")]
    DuplicateEntry(Identifier),

    #[error("ID not registered: {0}")]
    EntryNotFound(Identifier),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Protocol version {0} already appears in the parent chain")]
    CyclicParent(i32),

    #[error("Cache signature mismatch")]
    SignatureMismatch,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
