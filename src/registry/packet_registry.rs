//! # Packet Registry
//!
//! One [`PacketRegistry`] exists per protocol version. It owns the packet factories
//! defined by that version and inherits everything else from an optional parent
//! registry (an older version).
//!
//! ## Lookup Cache
//! Every registry keeps a flattened map `PacketKey -> CacheEntry` covering its own
//! entries and those of its ancestors:
//! - `Found(v)`: the factory lives in the local entries of the registry for version `v`
//! - `Removed`: the key was removed here (a tombstone), ancestors are not consulted
//! - no entry: the key is unknown
//!
//! Local mutations update the cache in place and are pushed down to every
//! descendant that has no definition of its own for the key.
//! [`PacketRegistry::pre_generate_cache`] rebuilds the whole map from scratch.
//!
//! ## Persistence
//! The cache can be written to disk together with a signature of the registry
//! shape. A stored cache is only applied when its signature matches the current
//! one. Persistence outcomes are reported through the event bus and the log,
//! never as errors to the caller.
//!
//! ## Locking
//! Local entries, tombstones and the cache of one registry sit behind a single
//! lock, held for the whole of a registration, removal or regeneration. When
//! two registries are locked at once the ancestor is always locked first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::identifier::Identifier;
use crate::error::{ProtocolError, Result};
use crate::event::EventBus;
use crate::protocol::packet::{PacketFactory, PacketKey};
use crate::registry::events::{
    CacheLoadFailed, CachePostLoad, CachePostSave, CachePreLoad, CachePreSave, CacheSaveFailed,
    PacketPostRegister, PacketPostRemove, PacketPreRegister, PacketPreRemove,
};

/// Resolution state of one key in a lookup cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheEntry {
    /// Defined by the registry for this protocol version.
    Found(i32),
    /// Explicitly removed.
    Removed,
}

/// On-disk layout of a persisted lookup cache.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    signature: String,
    entries: BTreeMap<PacketKey, CacheEntry>,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct State {
    local: HashMap<PacketKey, PacketFactory>,
    tombstones: HashSet<PacketKey>,
    lookup_cache: HashMap<PacketKey, CacheEntry>,
}

impl State {
    fn defines(&self, key: &PacketKey) -> bool {
        self.local.contains_key(key) || self.tombstones.contains(key)
    }

    /// Sorted local keys followed by sorted `!`-prefixed tombstones.
    fn shape(&self) -> String {
        let mut keys: Vec<_> = self.local.keys().copied().collect();
        keys.sort_unstable();
        let mut tombstones: Vec<_> = self.tombstones.iter().copied().collect();
        tombstones.sort_unstable();

        keys.iter()
            .map(ToString::to_string)
            .chain(tombstones.iter().map(|k| format!("!{k}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Packet catalog of one protocol version.
pub struct PacketRegistry {
    version: i32,
    identifier: Identifier,
    parent: Option<Arc<PacketRegistry>>,
    children: RwLock<Vec<Weak<PacketRegistry>>>,
    state: RwLock<State>,
    bus: EventBus,
}

impl fmt::Debug for PacketRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRegistry")
            .field("version", &self.version)
            .field("parent", &self.parent.as_ref().map(|p| p.version))
            .field("local", &self.local_keys())
            .field("cache", &read_lock(&self.state).lookup_cache.len())
            .finish()
    }
}

impl PacketRegistry {
    /// Root registry with no parent.
    pub fn new(version: i32, bus: EventBus) -> Arc<Self> {
        Arc::new(Self::build(version, None, HashMap::new(), bus))
    }

    /// Registry inheriting from `parent`.
    ///
    /// The new registry starts with a copy of the parent's cache, so inherited
    /// packets resolve before any local registration.
    ///
    /// # Errors
    /// [`ProtocolError::CyclicParent`] if `version` already appears in the parent chain.
    pub fn with_parent(version: i32, parent: &Arc<Self>, bus: EventBus) -> Result<Arc<Self>> {
        if parent.ancestry().any(|r| r.version == version) {
            return Err(ProtocolError::CyclicParent(version));
        }

        // Held until the child is linked, so no parent mutation slips between
        // the cache copy and the point where propagation can reach the child.
        let parent_state = read_lock(&parent.state);
        let cache = parent_state.lookup_cache.clone();
        let registry = Arc::new(Self::build(version, Some(parent.clone()), cache, bus));

        let mut children = write_lock(&parent.children);
        children.retain(|child| child.strong_count() > 0);
        children.push(Arc::downgrade(&registry));
        drop(children);
        drop(parent_state);

        debug!(version, parent = parent.version, "Created child packet registry");
        Ok(registry)
    }

    fn build(
        version: i32,
        parent: Option<Arc<Self>>,
        cache: HashMap<PacketKey, CacheEntry>,
        bus: EventBus,
    ) -> Self {
        Self {
            version,
            identifier: Identifier::versioned("packet_registry", version),
            parent,
            children: RwLock::new(Vec::new()),
            state: RwLock::new(State {
                lookup_cache: cache,
                ..State::default()
            }),
            bus,
        }
    }

    pub fn protocol_version(&self) -> i32 {
        self.version
    }

    /// `candlemc:packet_registry/<version>`
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn parent(&self) -> Option<&Arc<PacketRegistry>> {
        self.parent.as_ref()
    }

    /// This registry followed by each ancestor, nearest first.
    fn ancestry(&self) -> impl Iterator<Item = &PacketRegistry> {
        std::iter::successors(Some(self), |r| r.parent.as_deref())
    }

    /// Keys defined locally, sorted.
    pub fn local_keys(&self) -> Vec<PacketKey> {
        let mut keys: Vec<_> = read_lock(&self.state).local.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Factory defined by this version itself, ignoring the cache and ancestors.
    pub fn local_factory(&self, key: &PacketKey) -> Option<PacketFactory> {
        read_lock(&self.state).local.get(key).cloned()
    }

    pub fn cache_entry(&self, key: &PacketKey) -> Option<CacheEntry> {
        read_lock(&self.state).lookup_cache.get(key).copied()
    }

    /// Sorted copy of the lookup cache.
    pub fn cache_snapshot(&self) -> BTreeMap<PacketKey, CacheEntry> {
        read_lock(&self.state)
            .lookup_cache
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    /// Define `key` in this version.
    ///
    /// The factory is resolvable from this registry, and from every descendant
    /// that does not define the key itself, once this returns.
    ///
    /// # Errors
    /// [`ProtocolError::DuplicatePacket`] if this version already defines `key`.
    pub fn register_packet(&self, key: PacketKey, factory: PacketFactory) -> Result<()> {
        let mut state = write_lock(&self.state);
        if state.local.contains_key(&key) {
            return Err(ProtocolError::DuplicatePacket(key));
        }

        self.bus.publish(PacketPreRegister {
            protocol_version: self.version,
            key,
        });

        state.local.insert(key, factory);
        state.tombstones.remove(&key);
        let entry = CacheEntry::Found(self.version);
        state.lookup_cache.insert(key, entry);
        self.propagate_to_children(key, entry);
        drop(state);

        self.bus.publish(PacketPostRegister {
            protocol_version: self.version,
            key,
        });
        info!(%key, protocol_version = self.version, "Packet registered");
        Ok(())
    }

    /// Remove `key` from this version and leave a tombstone, hiding any
    /// definition inherited from an ancestor.
    ///
    /// A key that does not currently resolve here is logged and ignored.
    pub fn remove_packet(&self, key: PacketKey) {
        let mut state = write_lock(&self.state);
        let visible = state.local.contains_key(&key)
            || matches!(state.lookup_cache.get(&key), Some(CacheEntry::Found(_)));
        if !visible {
            warn!(%key, protocol_version = self.version, "No packet found to remove");
            return;
        }

        self.bus.publish(PacketPreRemove {
            protocol_version: self.version,
            key,
        });

        state.local.remove(&key);
        state.tombstones.insert(key);
        state.lookup_cache.insert(key, CacheEntry::Removed);
        self.propagate_to_children(key, CacheEntry::Removed);
        drop(state);

        self.bus.publish(PacketPostRemove {
            protocol_version: self.version,
            key,
        });
        info!(%key, protocol_version = self.version, "Packet removed");
    }

    /// Push a cache change to descendants. A descendant with its own definition
    /// or tombstone for `key` keeps it, and shields its own descendants.
    ///
    /// Called with this registry's state locked; each child stays locked while
    /// its own descendants are updated.
    fn propagate_to_children(&self, key: PacketKey, entry: CacheEntry) {
        let children: Vec<Arc<PacketRegistry>> = read_lock(&self.children)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        for child in children {
            let mut state = write_lock(&child.state);
            if state.defines(&key) {
                debug!(%key, version = child.version, "Local override, propagation skipped");
                continue;
            }
            state.lookup_cache.insert(key, entry);
            child.propagate_to_children(key, entry);
        }
    }

    /// Factory for `key`, from the cache only.
    ///
    /// `Found(v)` names the registry for version `v`, which is always this one or
    /// an ancestor, so the owner is found by walking the parent chain rather than
    /// through [`PacketRegistries`](crate::registry::PacketRegistries). The factory
    /// is then read from the owner's local entries. `Removed` and unknown keys both
    /// resolve to `None`.
    pub fn resolve_factory(&self, key: &PacketKey) -> Option<PacketFactory> {
        match self.cache_entry(key)? {
            CacheEntry::Found(version) => self
                .ancestry()
                .find(|r| r.version == version)
                .and_then(|owner| owner.local_factory(key)),
            CacheEntry::Removed => None,
        }
    }

    /// Rebuild the cache of this registry and of every ancestor.
    ///
    /// The parent is regenerated first, its cache copied, then tombstones and
    /// local entries are laid over it. The parent stays read-locked and this
    /// registry write-locked from the copy until the new cache is in place.
    pub fn pre_generate_cache(&self) {
        let size = match &self.parent {
            Some(parent) => {
                parent.pre_generate_cache();
                let parent_state = read_lock(&parent.state);
                let mut state = write_lock(&self.state);
                let cache = self.overlay(parent_state.lookup_cache.clone(), &state);
                state.lookup_cache = cache;
                state.lookup_cache.len()
            }
            None => {
                let mut state = write_lock(&self.state);
                let cache = self.overlay(HashMap::new(), &state);
                state.lookup_cache = cache;
                state.lookup_cache.len()
            }
        };

        info!(protocol_version = self.version, entries = size, "Lookup cache generated");
    }

    fn overlay(
        &self,
        mut cache: HashMap<PacketKey, CacheEntry>,
        state: &State,
    ) -> HashMap<PacketKey, CacheEntry> {
        for key in &state.tombstones {
            cache.insert(*key, CacheEntry::Removed);
        }
        for key in state.local.keys() {
            cache.insert(*key, CacheEntry::Found(self.version));
        }
        cache
    }

    /// Fingerprint of the registry shape: the parent's signature, the version,
    /// then the sorted local keys and tombstones.
    pub fn compute_signature(&self) -> String {
        let parent = self.parent_signature();
        self.signature_with(&parent, &read_lock(&self.state))
    }

    fn parent_signature(&self) -> String {
        self.parent
            .as_ref()
            .map(|p| p.compute_signature())
            .unwrap_or_default()
    }

    fn signature_with(&self, parent: &str, state: &State) -> String {
        format!("{parent}-{}-{}", self.version, state.shape())
    }

    /// Write `(signature, cache)` to `path`.
    ///
    /// Publishes [`CachePreSave`], then [`CachePostSave`] or [`CacheSaveFailed`].
    pub fn save_cache_to_disk(&self, path: &Path) {
        self.bus.publish(CachePreSave {
            protocol_version: self.version,
            path: path.to_path_buf(),
        });

        match self.write_cache_file(path) {
            Ok(()) => {
                info!(protocol_version = self.version, path = %path.display(), "Cache saved");
                self.bus.publish(CachePostSave {
                    protocol_version: self.version,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                error!(protocol_version = self.version, path = %path.display(), error = %e, "Cache saving failed");
                self.bus.publish(CacheSaveFailed {
                    protocol_version: self.version,
                    path: path.to_path_buf(),
                    error: Arc::new(e),
                });
            }
        }
    }

    fn write_cache_file(&self, path: &Path) -> Result<()> {
        let parent = self.parent_signature();
        let file = {
            let state = read_lock(&self.state);
            CacheFile {
                signature: self.signature_with(&parent, &state),
                entries: state
                    .lookup_cache
                    .iter()
                    .map(|(k, v)| (*k, *v))
                    .collect(),
            }
        };
        let bytes = bincode::serialize(&file)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Replace the cache with the one stored at `path` if its signature matches.
    ///
    /// A missing file is not an error. Publishes [`CachePreLoad`], then
    /// [`CachePostLoad`] or [`CacheLoadFailed`]; on failure the in-memory cache
    /// is left untouched.
    pub fn load_cache_from_disk(&self, path: &Path) {
        if !path.exists() {
            info!(protocol_version = self.version, path = %path.display(), "No cache file found");
            return;
        }

        self.bus.publish(CachePreLoad {
            protocol_version: self.version,
            path: path.to_path_buf(),
        });

        match self.apply_cache_file(path) {
            Ok(size) => {
                info!(protocol_version = self.version, entries = size, "Cache loaded");
                self.bus.publish(CachePostLoad {
                    protocol_version: self.version,
                    path: path.to_path_buf(),
                });
            }
            Err(e) => {
                match &e {
                    ProtocolError::SignatureMismatch => {
                        info!(protocol_version = self.version, "Cache is stale, signature mismatch");
                    }
                    other => {
                        error!(protocol_version = self.version, path = %path.display(), error = %other, "Cache loading failed");
                    }
                }
                self.bus.publish(CacheLoadFailed {
                    protocol_version: self.version,
                    path: path.to_path_buf(),
                    error: Arc::new(e),
                });
            }
        }
    }

    /// Signature check and swap happen under one lock; returns the entry count.
    fn apply_cache_file(&self, path: &Path) -> Result<usize> {
        let bytes = fs::read(path)?;
        let file: CacheFile = bincode::deserialize(&bytes)?;

        let parent = self.parent_signature();
        let mut state = write_lock(&self.state);
        if file.signature != self.signature_with(&parent, &state) {
            return Err(ProtocolError::SignatureMismatch);
        }
        state.lookup_cache = file.entries.into_iter().collect();
        Ok(state.lookup_cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::RawPacket;
    use crate::protocol::state::ConnectionState;

    const K1: PacketKey = PacketKey::new(ConnectionState::Play, 0x01);
    const K2: PacketKey = PacketKey::new(ConnectionState::Play, 0x02);

    fn factory() -> PacketFactory {
        RawPacket::factory(ConnectionState::Play)
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let reg = PacketRegistry::new(1, EventBus::new(1));
        reg.register_packet(K1, factory()).unwrap();
        assert!(matches!(
            reg.register_packet(K1, factory()),
            Err(ProtocolError::DuplicatePacket(k)) if k == K1
        ));
    }

    #[test]
    fn test_registration_visible_on_return() {
        let reg = PacketRegistry::new(1, EventBus::new(1));
        reg.register_packet(K1, factory()).unwrap();
        assert_eq!(reg.cache_entry(&K1), Some(CacheEntry::Found(1)));
        assert!(reg.resolve_factory(&K1).is_some());
        assert!(reg.resolve_factory(&K2).is_none());
    }

    #[test]
    fn test_child_inherits_parent_cache() {
        let bus = EventBus::new(1);
        let parent = PacketRegistry::new(1, bus.clone());
        parent.register_packet(K1, factory()).unwrap();

        let child = PacketRegistry::with_parent(2, &parent, bus).unwrap();
        assert_eq!(child.cache_entry(&K1), Some(CacheEntry::Found(1)));
        assert!(child.resolve_factory(&K1).is_some());
    }

    #[test]
    fn test_parent_registration_reaches_grandchild() {
        let bus = EventBus::new(1);
        let root = PacketRegistry::new(1, bus.clone());
        let mid = PacketRegistry::with_parent(2, &root, bus.clone()).unwrap();
        let leaf = PacketRegistry::with_parent(3, &mid, bus).unwrap();

        root.register_packet(K1, factory()).unwrap();
        assert_eq!(leaf.cache_entry(&K1), Some(CacheEntry::Found(1)));

        mid.register_packet(K2, factory()).unwrap();
        assert_eq!(leaf.cache_entry(&K2), Some(CacheEntry::Found(2)));
        assert_eq!(root.cache_entry(&K2), None);
    }

    #[test]
    fn test_override_shields_descendants() {
        let bus = EventBus::new(1);
        let root = PacketRegistry::new(1, bus.clone());
        let mid = PacketRegistry::with_parent(2, &root, bus.clone()).unwrap();
        let leaf = PacketRegistry::with_parent(3, &mid, bus).unwrap();

        mid.register_packet(K1, factory()).unwrap();
        root.register_packet(K1, factory()).unwrap();

        assert_eq!(mid.cache_entry(&K1), Some(CacheEntry::Found(2)));
        assert_eq!(leaf.cache_entry(&K1), Some(CacheEntry::Found(2)));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let reg = PacketRegistry::new(1, EventBus::new(1));
        reg.remove_packet(K1);
        assert_eq!(reg.cache_entry(&K1), None);
        assert_eq!(reg.compute_signature(), "-1-");
    }

    #[test]
    fn test_reregister_after_remove_clears_tombstone() {
        let reg = PacketRegistry::new(1, EventBus::new(1));
        reg.register_packet(K1, factory()).unwrap();
        reg.remove_packet(K1);
        assert_eq!(reg.cache_entry(&K1), Some(CacheEntry::Removed));

        reg.register_packet(K1, factory()).unwrap();
        reg.pre_generate_cache();
        assert_eq!(reg.cache_entry(&K1), Some(CacheEntry::Found(1)));
    }

    #[test]
    fn test_cyclic_parent_rejected() {
        let bus = EventBus::new(1);
        let root = PacketRegistry::new(1, bus.clone());
        let child = PacketRegistry::with_parent(2, &root, bus.clone()).unwrap();

        assert!(matches!(
            PacketRegistry::with_parent(1, &child, bus.clone()),
            Err(ProtocolError::CyclicParent(1))
        ));
        assert!(matches!(
            PacketRegistry::with_parent(2, &child, bus),
            Err(ProtocolError::CyclicParent(2))
        ));
    }

    #[test]
    fn test_signature_layout() {
        let bus = EventBus::new(1);
        let root = PacketRegistry::new(1, bus.clone());
        root.register_packet(K2, factory()).unwrap();
        root.register_packet(K1, factory()).unwrap();
        let child = PacketRegistry::with_parent(2, &root, bus).unwrap();
        child.remove_packet(K1);

        assert_eq!(root.compute_signature(), "-1-Play/0x01,Play/0x02");
        assert_eq!(
            child.compute_signature(),
            "-1-Play/0x01,Play/0x02-2-!Play/0x01"
        );
    }

    #[test]
    fn test_identifier() {
        let reg = PacketRegistry::new(769, EventBus::new(1));
        assert_eq!(reg.identifier().to_string(), "candlemc:packet_registry/769");
    }
}
