//! # Core Protocol Components
//!
//! Identifiers, primitive wire codecs and packet framing.
//!
//! ## Components
//! - **Identifier**: `namespace:path` keys used by every registry
//! - **Codec**: the [`codec::TypeCodec`] contract and the per-version [`codec::DataCodec`] catalog
//! - **Types**: VarInt, String, UnsignedShort, Long and UUID codecs
//! - **Frame**: length-prefixed framing as a Tokio codec
//!
//! ## Wire Format
//! ```text
//! [VarInt length] [VarInt packet id] [payload]
//! ```
//!
//! ## Security
//! - Maximum frame size: 2 MiB by default (prevents memory exhaustion)
//! - VarInts longer than 5 bytes are rejected
//! - Length validation before allocation

pub mod codec;
pub mod frame;
pub mod identifier;
pub mod types;
