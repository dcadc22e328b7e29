//! Notifications published by the registries.
//!
//! Packet events are partitioned by packet key, so all notifications about one
//! key arrive in publish order. Cache events are partitioned by protocol version.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::identifier::Identifier;
use crate::error::ProtocolError;
use crate::event::{partition_of, Event};
use crate::protocol::packet::PacketKey;

macro_rules! entry_event {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub registry: Identifier,
            pub id: Identifier,
        }

        impl Event for $name {
            fn partition(&self) -> u64 {
                partition_of(&(&self.registry, &self.id))
            }
        }
    };
}

macro_rules! packet_event {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub protocol_version: i32,
            pub key: PacketKey,
        }

        impl Event for $name {
            fn partition(&self) -> u64 {
                partition_of(&self.key)
            }
        }
    };
}

macro_rules! cache_event {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub protocol_version: i32,
            pub path: PathBuf,
        }

        impl Event for $name {
            fn partition(&self) -> u64 {
                partition_of(&self.protocol_version)
            }
        }
    };
}

macro_rules! cache_failure_event {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            pub protocol_version: i32,
            pub path: PathBuf,
            pub error: Arc<ProtocolError>,
        }

        impl Event for $name {
            fn partition(&self) -> u64 {
                partition_of(&self.protocol_version)
            }
        }
    };
}

entry_event!(
    /// An entry was added to a [`Registry`](crate::registry::Registry).
    EntryRegistered
);
entry_event!(EntryRemoved);
entry_event!(EntryUpdated);

packet_event!(
    /// Published before a packet factory is committed.
    PacketPreRegister
);
packet_event!(
    /// Published once the factory is resolvable.
    PacketPostRegister
);
packet_event!(PacketPreRemove);
packet_event!(
    /// Published once the key resolves to nothing.
    PacketPostRemove
);

cache_event!(CachePreSave);
cache_event!(CachePostSave);
cache_event!(CachePreLoad);
cache_event!(
    /// The stored cache matched and replaced the in-memory one.
    CachePostLoad
);

cache_failure_event!(
    /// Writing the cache file failed. The in-memory cache is unaffected.
    CacheSaveFailed
);
cache_failure_event!(
    /// The cache file could not be read, could not be decoded, or carried a
    /// stale signature. The in-memory cache is unaffected.
    CacheLoadFailed
);
