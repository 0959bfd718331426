//! Object Store
//!
//! In-memory store of entries (images, masks, planar figures and derived statistics).
//! Entries carry a name, a data payload, a property map and a modification timestamp.
//! All mutations go through a single mutex; change listeners are invoked after the
//! lock is released so they may safely read the store again.

pub mod clock;
pub mod predicate;

pub use predicate::Predicate;

use crate::error::StoreError;
use crate::statistics::{Image, MaskImage, PlanarFigure, StatisticsContainer};
use crate::types::{EntryId, PropertyValue, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Kind of payload carried by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Image,
    Mask,
    PlanarFigure,
    Statistics,
    Empty,
}

/// Payload of a store entry. Payloads are shared, so cloning an entry is cheap.
#[derive(Debug, Clone)]
pub enum EntryData {
    Image(Arc<Image>),
    Mask(Arc<MaskImage>),
    PlanarFigure(Arc<PlanarFigure>),
    Statistics(Arc<StatisticsContainer>),
    Empty,
}

impl EntryData {
    pub fn kind(&self) -> DataKind {
        match self {
            EntryData::Image(_) => DataKind::Image,
            EntryData::Mask(_) => DataKind::Mask,
            EntryData::PlanarFigure(_) => DataKind::PlanarFigure,
            EntryData::Statistics(_) => DataKind::Statistics,
            EntryData::Empty => DataKind::Empty,
        }
    }
}

/// A node in the object store
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: EntryId,
    pub name: String,
    pub data: EntryData,
    pub properties: BTreeMap<String, PropertyValue>,
    pub modified: Timestamp,
}

impl Entry {
    /// Create a new entry stamped with the current clock reading
    pub fn new(name: impl Into<String>, data: EntryData) -> Self {
        Self {
            id: EntryId::next(),
            name: name.into(),
            data,
            properties: BTreeMap::new(),
            modified: clock::tick(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn kind(&self) -> DataKind {
        self.data.kind()
    }
}

/// Change notification emitted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
    Added(EntryId),
    Modified(EntryId),
    Removed(EntryId),
}

impl StoreEvent {
    pub fn entry_id(&self) -> EntryId {
        match self {
            StoreEvent::Added(id) | StoreEvent::Modified(id) | StoreEvent::Removed(id) => *id,
        }
    }
}

/// Handle returned by [`ObjectStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Shared, mutex-guarded object store
pub struct ObjectStore {
    entries: Mutex<BTreeMap<EntryId, Entry>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("entries", &self.entries.lock().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Add an entry and return its id
    pub fn add(&self, entry: Entry) -> EntryId {
        let id = entry.id;
        self.entries.lock().insert(id, entry);
        trace!(entry = %id, "Entry added");
        self.notify(&[StoreEvent::Added(id)]);
        id
    }

    /// Add several entries under a single lock acquisition
    pub fn add_all(&self, entries: Vec<Entry>) -> Vec<EntryId> {
        let ids: Vec<EntryId> = entries.iter().map(|e| e.id).collect();
        {
            let mut guard = self.entries.lock();
            for entry in entries {
                guard.insert(entry.id, entry);
            }
        }
        let events: Vec<StoreEvent> = ids.iter().map(|id| StoreEvent::Added(*id)).collect();
        self.notify(&events);
        ids
    }

    /// Remove the given entries; unknown ids are ignored. Returns the number removed.
    pub fn remove(&self, ids: &[EntryId]) -> usize {
        let removed: Vec<EntryId> = {
            let mut guard = self.entries.lock();
            ids.iter()
                .filter(|id| guard.remove(*id).is_some())
                .copied()
                .collect()
        };
        let events: Vec<StoreEvent> = removed.iter().map(|id| StoreEvent::Removed(*id)).collect();
        self.notify(&events);
        removed.len()
    }

    pub fn exists(&self, id: EntryId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    pub fn get(&self, id: EntryId) -> Option<Entry> {
        self.entries.lock().get(&id).cloned()
    }

    /// All entries matching the predicate, in insertion order
    pub fn query(&self, predicate: &Predicate) -> Vec<Entry> {
        self.entries
            .lock()
            .values()
            .filter(|entry| predicate.matches(entry))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Mark an entry as modified, advancing its timestamp
    pub fn touch(&self, id: EntryId) -> Result<Timestamp, StoreError> {
        let stamp = {
            let mut guard = self.entries.lock();
            let entry = guard.get_mut(&id).ok_or(StoreError::EntryNotFound(id))?;
            entry.modified = clock::tick();
            entry.modified
        };
        self.notify(&[StoreEvent::Modified(id)]);
        Ok(stamp)
    }

    /// Replace an entry's payload, advancing its timestamp
    pub fn replace_data(&self, id: EntryId, data: EntryData) -> Result<Timestamp, StoreError> {
        let stamp = {
            let mut guard = self.entries.lock();
            let entry = guard.get_mut(&id).ok_or(StoreError::EntryNotFound(id))?;
            entry.data = data;
            entry.modified = clock::tick();
            entry.modified
        };
        self.notify(&[StoreEvent::Modified(id)]);
        Ok(stamp)
    }

    /// Set a property on an entry. Property changes do not advance the timestamp.
    pub fn set_property(
        &self,
        id: EntryId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), StoreError> {
        {
            let mut guard = self.entries.lock();
            let entry = guard.get_mut(&id).ok_or(StoreError::EntryNotFound(id))?;
            entry.properties.insert(key.into(), value.into());
        }
        self.notify(&[StoreEvent::Modified(id)]);
        Ok(())
    }

    /// Register a change listener. Listeners run on the mutating thread.
    pub fn subscribe(&self, listener: impl Fn(&StoreEvent) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }

    fn notify(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}
