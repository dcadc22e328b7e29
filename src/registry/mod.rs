//! # Registries
//!
//! [`Registry<T>`] is an identifier-keyed, thread-safe map that announces every
//! change on the [`EventBus`]. The codec catalogs and the registry of packet
//! registries are built on it. [`packet_registry::PacketRegistry`] is the
//! versioned packet catalog with its parent chain and lookup cache.
//!
//! Mutations are committed before their notification is published, so a value is
//! visible to `get` as soon as `register` returns.

pub mod events;
pub mod packet_registry;
pub mod registries;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::identifier::Identifier;
use crate::error::{ProtocolError, Result};
use crate::event::EventBus;
use events::{EntryRegistered, EntryRemoved, EntryUpdated};

pub use packet_registry::{CacheEntry, PacketRegistry};
pub use registries::PacketRegistries;

/// Identifier-keyed store of `T` values.
pub struct Registry<T> {
    identifier: Identifier,
    entries: RwLock<HashMap<Identifier, T>>,
    bus: EventBus,
}

impl<T> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("identifier", &self.identifier)
            .field("entries", &self.len())
            .finish()
    }
}

impl<T> Registry<T> {
    pub fn new(identifier: Identifier, bus: EventBus) -> Self {
        Self {
            identifier,
            entries: RwLock::new(HashMap::new()),
            bus,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn is_registered(&self, id: &Identifier) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add `value` under `id`.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicateEntry`] if `id` is already present.
    pub fn register(&self, id: Identifier, value: T) -> Result<()> {
        {
            let mut entries = self.write();
            if entries.contains_key(&id) {
                return Err(ProtocolError::DuplicateEntry(id));
            }
            entries.insert(id.clone(), value);
        }

        debug!(registry = %self.identifier, %id, "Registered entry");
        self.bus.publish(EntryRegistered {
            registry: self.identifier.clone(),
            id,
        });
        Ok(())
    }

    /// Remove and return the value under `id`. Removing an absent id is logged
    /// and otherwise ignored.
    pub fn remove(&self, id: &Identifier) -> Option<T> {
        let removed = self.write().remove(id);
        match removed {
            Some(value) => {
                debug!(registry = %self.identifier, %id, "Removed entry");
                self.bus.publish(EntryRemoved {
                    registry: self.identifier.clone(),
                    id: id.clone(),
                });
                Some(value)
            }
            None => {
                warn!(registry = %self.identifier, %id, "No entry found for removal");
                None
            }
        }
    }

    /// Replace the value under `id`, returning the previous one.
    ///
    /// # Errors
    /// [`ProtocolError::EntryNotFound`] if `id` is absent.
    pub fn update(&self, id: &Identifier, value: T) -> Result<T> {
        let previous = {
            let mut entries = self.write();
            let slot = entries
                .get_mut(id)
                .ok_or_else(|| ProtocolError::EntryNotFound(id.clone()))?;
            std::mem::replace(slot, value)
        };

        debug!(registry = %self.identifier, %id, "Updated entry");
        self.bus.publish(EntryUpdated {
            registry: self.identifier.clone(),
            id: id.clone(),
        });
        Ok(previous)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Identifier, T>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Identifier, T>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Registry<T> {
    pub fn get(&self, id: &Identifier) -> Option<T> {
        self.read().get(id).cloned()
    }

    /// Snapshot of every entry.
    pub fn all(&self) -> HashMap<Identifier, T> {
        self.read().clone()
    }
}

impl<T: Serialize> Registry<T> {
    /// Write every entry to `path` with bincode.
    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(&*self.read())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        info!(registry = %self.identifier, path = %path.display(), "Saved registry");
        Ok(())
    }
}

impl<T: DeserializeOwned> Registry<T> {
    /// Replace every entry with the contents of `path`.
    ///
    /// A missing file leaves the registry as it is. A file that fails to decode
    /// also leaves it untouched and returns the error.
    pub fn load_from_disk(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            debug!(registry = %self.identifier, path = %path.display(), "No saved data found");
            return Ok(());
        }

        let bytes = fs::read(path)?;
        let loaded: HashMap<Identifier, T> = bincode::deserialize(&bytes)?;
        let count = loaded.len();
        *self.write() = loaded;

        info!(registry = %self.identifier, count, "Loaded registry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn id(path: &str) -> Identifier {
        Identifier::new("test", path).unwrap()
    }

    fn registry(bus: &EventBus) -> Registry<u32> {
        Registry::new(id("numbers"), bus.clone())
    }

    #[test]
    fn test_register_get_update_remove() {
        let bus = EventBus::new(1);
        let reg = registry(&bus);

        reg.register(id("one"), 1).unwrap();
        assert_eq!(reg.get(&id("one")), Some(1));
        assert!(reg.is_registered(&id("one")));

        assert_eq!(reg.update(&id("one"), 11).unwrap(), 1);
        assert_eq!(reg.get(&id("one")), Some(11));

        assert_eq!(reg.remove(&id("one")), Some(11));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_duplicate_and_missing() {
        let bus = EventBus::new(1);
        let reg = registry(&bus);
        reg.register(id("one"), 1).unwrap();

        assert!(matches!(
            reg.register(id("one"), 2),
            Err(ProtocolError::DuplicateEntry(_))
        ));
        assert_eq!(reg.get(&id("one")), Some(1));

        assert!(matches!(
            reg.update(&id("two"), 2),
            Err(ProtocolError::EntryNotFound(_))
        ));
        assert_eq!(reg.remove(&id("two")), None);
    }

    #[test]
    fn test_events_are_published() {
        // One worker, so the final publish is delivered after everything before it.
        let bus = EventBus::new(1);
        let registered = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let r = registered.clone();
        bus.subscribe(move |_: &EntryRegistered| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let r = removed.clone();
        bus.subscribe(move |_: &EntryRemoved| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        let reg = registry(&bus);
        reg.register(id("a"), 1).unwrap();
        reg.register(id("b"), 2).unwrap();
        reg.remove(&id("a"));
        reg.remove(&id("missing"));
        reg.register(id("c"), 3).unwrap();

        bus.publish(EntryRegistered {
            registry: id("numbers"),
            id: id("flush"),
        })
        .wait_blocking();

        assert_eq!(registered.load(Ordering::SeqCst), 4);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("numbers.bin");
        let bus = EventBus::new(1);

        let reg = registry(&bus);
        reg.register(id("a"), 1).unwrap();
        reg.register(id("b"), 2).unwrap();
        reg.save_to_disk(&path).unwrap();

        let restored = registry(&bus);
        restored.register(id("stale"), 9).unwrap();
        restored.load_from_disk(&path).unwrap();
        assert_eq!(restored.all(), reg.all());
    }

    #[test]
    fn test_load_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(1);
        let reg = registry(&bus);
        reg.register(id("a"), 1).unwrap();

        reg.load_from_disk(&dir.path().join("absent.bin")).unwrap();
        assert_eq!(reg.get(&id("a")), Some(1));
    }
}
