//! The registry of packet registries, one entry per supported protocol version.

use std::sync::Arc;

use crate::core::identifier::Identifier;
use crate::error::Result;
use crate::event::EventBus;
use crate::registry::packet_registry::PacketRegistry;
use crate::registry::Registry;

/// Identifier of the [`PacketRegistries`] registry itself.
pub const PACKET_REGISTRIES_ID: Identifier = Identifier::from_static("candlemc", "packet_registry");

/// Packet registries keyed by `candlemc:packet_registry/<version>`.
#[derive(Debug)]
pub struct PacketRegistries {
    inner: Registry<Arc<PacketRegistry>>,
}

impl PacketRegistries {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Registry::new(PACKET_REGISTRIES_ID, bus),
        }
    }

    /// Add a version's registry under its own identifier.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicateEntry`](crate::error::ProtocolError::DuplicateEntry)
    /// if that version is already present.
    pub fn register(&self, registry: Arc<PacketRegistry>) -> Result<()> {
        self.inner.register(registry.identifier().clone(), registry)
    }

    pub fn by_protocol_version(&self, version: i32) -> Option<Arc<PacketRegistry>> {
        self.inner
            .get(&Identifier::versioned("packet_registry", version))
    }

    pub fn remove(&self, version: i32) -> Option<Arc<PacketRegistry>> {
        self.inner
            .remove(&Identifier::versioned("packet_registry", version))
    }

    /// Registered protocol versions, ascending.
    pub fn versions(&self) -> Vec<i32> {
        let mut versions: Vec<i32> = self
            .inner
            .all()
            .values()
            .map(|r| r.protocol_version())
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
