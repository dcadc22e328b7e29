//! # Transport Layer
//!
//! A single TCP listener; every accepted connection is handled on its own task.
//! There is no TLS, compression or encryption layer.
//!
//! ## Components
//! - **Server**: [`server::Server`] accept loop with graceful shutdown, and the
//!   [`server::ServerContext`] shared by all connections
//! - **Connection**: reads one framed handshake, reports it and closes

pub mod connection;
pub mod server;

pub use connection::{handle_connection, read_handshake, PacketDecoded};
pub use server::{Server, ServerContext};
