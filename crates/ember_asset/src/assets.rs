use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use ember_ecs::change_detection::ResMut;
use ember_ecs::component::Resource;
use ember_ecs::system::EventWriter;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    event::AssetEvent,
    handle::{Handle, HandleProvider},
    id::{AssetId, InternalAssetId},
    index::{AssetIndex, AssetIndexAllocator},
    server::AssetServer,
    Asset,
};

/// An insertion against a slot whose generation does not match, or whose
/// slot has been released.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidGenerationError {
    #[error(
        "asset index {index:?} has an invalid generation (current generation: {current_generation})"
    )]
    Occupied {
        index: AssetIndex,
        current_generation: u32,
    },
    #[error("asset index {index:?} has been removed")]
    Removed { index: AssetIndex },
}

/// Lookup failures, surfaced by [`Assets::try_get`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssetError {
    #[error("no asset present for the given id")]
    NotPresent,
    #[error("asset index {index} is out of bounds")]
    IndexOutOfBound { index: u32 },
    #[error("asset slot at index {index} is empty")]
    SlotEmpty { index: u32 },
    #[error("generation mismatch at index {index} (expected {expected}, current {current})")]
    GenMismatch {
        index: u32,
        expected: u32,
        current: u32,
    },
}

#[derive(Default)]
enum Entry<A: Asset> {
    /// No live handle references this slot.
    #[default]
    None,
    /// A live handle exists for this slot at `generation`; the value may
    /// still be pending.
    Some { value: Option<A>, generation: u32 },
}

/// The dense half of [`Assets`]: a slot vector indexed by
/// [`AssetIndex::index`], synchronized lazily against the allocator's
/// reservation stream.
struct DenseAssetStorage<A: Asset> {
    storage: Vec<Entry<A>>,
    len: u32,
    allocator: Arc<AssetIndexAllocator>,
}

impl<A: Asset> Default for DenseAssetStorage<A> {
    fn default() -> Self {
        Self {
            storage: Vec::new(),
            len: 0,
            allocator: Arc::new(AssetIndexAllocator::default()),
        }
    }
}

impl<A: Asset> DenseAssetStorage<A> {
    fn len(&self) -> usize {
        self.len as usize
    }

    /// Applies reservations made since the last flush: grows the slot vector
    /// and stamps recycled slots with their new generation.
    fn flush(&mut self) {
        let new_len = (self.allocator.next_index() as usize).max(self.storage.len());
        self.storage.resize_with(new_len, || Entry::Some {
            value: None,
            generation: 0,
        });
        for reserved in self.allocator.drain_reserved() {
            self.storage[reserved.index() as usize] = Entry::Some {
                value: None,
                generation: reserved.generation(),
            };
        }
    }

    /// Returns `Ok(true)` if an existing value was replaced, `Ok(false)` if
    /// the slot was empty.
    fn insert(&mut self, index: AssetIndex, asset: A) -> Result<bool, InvalidGenerationError> {
        self.flush();
        match &mut self.storage[index.index() as usize] {
            Entry::Some { value, generation } if *generation == index.generation() => {
                let replaced = value.is_some();
                if !replaced {
                    self.len += 1;
                }
                *value = Some(asset);
                Ok(replaced)
            }
            Entry::Some { generation, .. } => Err(InvalidGenerationError::Occupied {
                index,
                current_generation: *generation,
            }),
            Entry::None => Err(InvalidGenerationError::Removed { index }),
        }
    }

    /// Removes the value, releasing the index for reuse and vacating the
    /// slot. Used when the last strong handle dropped.
    fn remove_dropped(&mut self, index: AssetIndex) -> Option<A> {
        let value = self.remove_value(index)?;
        self.storage[index.index() as usize] = Entry::None;
        self.allocator.release(index);
        Some(value)
    }

    /// Removes the value but keeps the slot and its generation alive: the
    /// handle remains valid and the slot can be repopulated.
    fn remove_still_alive(&mut self, index: AssetIndex) -> Option<A> {
        self.remove_value(index)
    }

    fn remove_value(&mut self, index: AssetIndex) -> Option<A> {
        self.flush();
        match &mut self.storage[index.index() as usize] {
            Entry::Some { value, generation } if *generation == index.generation() => {
                let taken = value.take();
                if taken.is_some() {
                    self.len -= 1;
                }
                taken
            }
            _ => None,
        }
    }

    /// Vacates a slot whose handles are gone even if no value was stored
    /// (e.g. a reserved handle that never loaded).
    fn release_dropped(&mut self, index: AssetIndex) {
        self.flush();
        if let Entry::Some { generation, .. } = &self.storage[index.index() as usize] {
            if *generation == index.generation() {
                self.storage[index.index() as usize] = Entry::None;
                self.allocator.release(index);
            }
        }
    }

    fn get(&self, index: AssetIndex) -> Option<&A> {
        match self.storage.get(index.index() as usize)? {
            Entry::Some { value, generation } if *generation == index.generation() => {
                value.as_ref()
            }
            _ => None,
        }
    }

    fn get_mut(&mut self, index: AssetIndex) -> Option<&mut A> {
        match self.storage.get_mut(index.index() as usize)? {
            Entry::Some { value, generation } if *generation == index.generation() => {
                value.as_mut()
            }
            _ => None,
        }
    }

    fn try_get(&self, index: AssetIndex) -> Result<&A, AssetError> {
        let entry = self
            .storage
            .get(index.index() as usize)
            .ok_or(AssetError::IndexOutOfBound {
                index: index.index(),
            })?;
        match entry {
            Entry::None => Err(AssetError::SlotEmpty {
                index: index.index(),
            }),
            Entry::Some { generation, .. } if *generation != index.generation() => {
                Err(AssetError::GenMismatch {
                    index: index.index(),
                    expected: index.generation(),
                    current: *generation,
                })
            }
            Entry::Some { value, .. } => value.as_ref().ok_or(AssetError::SlotEmpty {
                index: index.index(),
            }),
        }
    }

    fn ids(&self) -> impl Iterator<Item = AssetIndex> + '_ {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry {
                Entry::Some {
                    value: Some(_),
                    generation,
                } => Some(AssetIndex::new(index as u32, *generation)),
                _ => None,
            })
    }
}

/// Stores assets of type `A`, keyed by generational index (with a UUID
/// hash-map side-lane), and queues [`AssetEvent`]s describing every change.
pub struct Assets<A: Asset> {
    dense: DenseAssetStorage<A>,
    hash_map: HashMap<Uuid, A>,
    handle_provider: HandleProvider,
    queued_events: Vec<AssetEvent<A>>,
    /// Extra strong handles minted by `get_strong_handle`, per index.
    duplicate_handles: HashMap<AssetIndex, u16>,
}

impl<A: Asset> Resource for Assets<A> {}

impl<A: Asset> Default for Assets<A> {
    fn default() -> Self {
        let dense = DenseAssetStorage::<A>::default();
        let handle_provider = HandleProvider::new(TypeId::of::<A>(), dense.allocator.clone());
        Self {
            dense,
            hash_map: HashMap::new(),
            handle_provider,
            queued_events: Vec::new(),
            duplicate_handles: HashMap::new(),
        }
    }
}

impl<A: Asset> Assets<A> {
    /// The provider that reserves handles for this collection (shared with
    /// the asset server).
    pub fn get_handle_provider(&self) -> HandleProvider {
        self.handle_provider.clone()
    }

    /// Reserves a strong handle whose value can be inserted later.
    pub fn reserve_handle(&self) -> Handle<A> {
        self.handle_provider.reserve().typed()
    }

    /// Stores `asset` in a fresh slot and returns the owning handle.
    pub fn add(&mut self, asset: impl Into<A>) -> Handle<A> {
        let index = self.dense.allocator.reserve();
        self.insert_with_index(index, asset.into())
            .expect("a freshly reserved index is always insertable");
        Handle::Strong(
            self.handle_provider
                .get_handle(InternalAssetId::Index(index), false, None),
        )
    }

    /// Inserts `asset` under an existing id. `Ok(true)` means a value was
    /// replaced, `Ok(false)` that an empty slot was filled.
    pub fn insert(
        &mut self,
        id: impl Into<AssetId<A>>,
        asset: A,
    ) -> Result<bool, InvalidGenerationError> {
        match id.into() {
            AssetId::Index { index, .. } => self.insert_with_index(index, asset),
            AssetId::Uuid { uuid } => {
                let replaced = self.hash_map.insert(uuid, asset).is_some();
                self.queued_events.push(if replaced {
                    AssetEvent::Modified { id: uuid.into() }
                } else {
                    AssetEvent::Added { id: uuid.into() }
                });
                Ok(replaced)
            }
        }
    }

    pub(crate) fn queue_loaded_event(&mut self, index: AssetIndex) {
        self.queued_events
            .push(AssetEvent::LoadedWithDependencies { id: index.into() });
    }

    pub(crate) fn insert_with_index(
        &mut self,
        index: AssetIndex,
        asset: A,
    ) -> Result<bool, InvalidGenerationError> {
        let replaced = self.dense.insert(index, asset)?;
        self.queued_events.push(if replaced {
            AssetEvent::Modified { id: index.into() }
        } else {
            AssetEvent::Added { id: index.into() }
        });
        Ok(replaced)
    }

    /// Mints an additional strong handle for an asset already in the
    /// collection.
    pub fn get_strong_handle(&mut self, id: AssetId<A>) -> Option<Handle<A>> {
        if !self.contains(id) {
            return None;
        }
        let AssetId::Index { index, .. } = id else {
            // UUID assets are not lifetime-managed by handles.
            return None;
        };
        *self.duplicate_handles.entry(index).or_insert(0) += 1;
        Some(Handle::Strong(self.handle_provider.get_handle(
            InternalAssetId::Index(index),
            false,
            None,
        )))
    }

    pub fn contains(&self, id: impl Into<AssetId<A>>) -> bool {
        match id.into() {
            AssetId::Index { index, .. } => self.dense.get(index).is_some(),
            AssetId::Uuid { uuid } => self.hash_map.contains_key(&uuid),
        }
    }

    pub fn get(&self, id: impl Into<AssetId<A>>) -> Option<&A> {
        match id.into() {
            AssetId::Index { index, .. } => self.dense.get(index),
            AssetId::Uuid { uuid } => self.hash_map.get(&uuid),
        }
    }

    /// Like [`get`](Self::get) but explains why the lookup failed.
    pub fn try_get(&self, id: impl Into<AssetId<A>>) -> Result<&A, AssetError> {
        match id.into() {
            AssetId::Index { index, .. } => self.dense.try_get(index),
            AssetId::Uuid { uuid } => self.hash_map.get(&uuid).ok_or(AssetError::NotPresent),
        }
    }

    /// Mutable access; queues [`AssetEvent::Modified`].
    pub fn get_mut(&mut self, id: impl Into<AssetId<A>>) -> Option<&mut A> {
        let id: AssetId<A> = id.into();
        let value = match id {
            AssetId::Index { index, .. } => self.dense.get_mut(index),
            AssetId::Uuid { uuid } => self.hash_map.get_mut(&uuid),
        };
        if value.is_some() {
            self.queued_events.push(AssetEvent::Modified { id });
        }
        value
    }

    /// Forces removal of the value. The handle (and slot generation) stay
    /// alive, so the same id can be repopulated with
    /// [`insert`](Self::insert); the index is only released once the last
    /// strong handle drops.
    pub fn remove(&mut self, id: impl Into<AssetId<A>>) -> Option<A> {
        let id: AssetId<A> = id.into();
        let removed = match id {
            AssetId::Index { index, .. } => self.dense.remove_still_alive(index),
            AssetId::Uuid { uuid } => self.hash_map.remove(&uuid),
        };
        if removed.is_some() {
            self.queued_events.push(AssetEvent::Removed { id });
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.dense.len() + self.hash_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = AssetId<A>> + '_ {
        self.dense
            .ids()
            .map(AssetId::from)
            .chain(self.hash_map.keys().map(|&uuid| AssetId::from(uuid)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetId<A>, &A)> + '_ {
        self.dense
            .ids()
            .filter_map(|index| self.dense.get(index).map(|value| (AssetId::from(index), value)))
            .chain(
                self.hash_map
                    .iter()
                    .map(|(&uuid, value)| (AssetId::from(uuid), value)),
            )
    }

    /// Processes destruction events published by dropped strong handles:
    /// generation-matching drops free the value, release the index for
    /// reuse, and queue [`AssetEvent::Unused`] (plus `Removed` when a value
    /// was present).
    pub fn handle_events_manual(&mut self) {
        let provider = self.handle_provider.clone();
        while let Ok(drop_event) = provider.drop_receiver.try_recv() {
            let InternalAssetId::Index(index) = drop_event.id else {
                continue;
            };
            self.handle_dropped_index(index);
        }
    }

    fn handle_dropped_index(&mut self, index: AssetIndex) {
        match self.duplicate_handles.get_mut(&index) {
            None => {}
            Some(0) => {
                self.duplicate_handles.remove(&index);
            }
            Some(count) => {
                *count -= 1;
                return;
            }
        }
        let existed = self.dense.remove_dropped(index).is_some();
        if !existed {
            // A reserved or force-removed slot: release the index anyway so
            // it can be reused.
            self.dense.release_dropped(index);
        }
        self.queued_events
            .push(AssetEvent::Unused { id: index.into() });
        if existed {
            self.queued_events
                .push(AssetEvent::Removed { id: index.into() });
        }
    }

    /// System: drains handle-drop events, consulting the [`AssetServer`] (if
    /// present) so dropped loader-managed handles release their path
    /// records.
    pub fn track_assets(mut assets: ResMut<Self>, server: Option<ember_ecs::change_detection::Res<AssetServer>>) {
        let assets = &mut *assets;
        let provider = assets.handle_provider.clone();
        while let Ok(drop_event) = provider.drop_receiver.try_recv() {
            let id = drop_event.id;
            let InternalAssetId::Index(index) = id else {
                continue;
            };
            if drop_event.loader_managed {
                if let Some(server) = server.as_ref() {
                    if !server.process_handle_drop(id.untyped(provider.type_id)) {
                        // A new handle for the same path was created since
                        // the drop event fired; keep the asset.
                        continue;
                    }
                }
            }
            assets.handle_dropped_index(index);
        }
    }

    /// System: publishes queued [`AssetEvent`]s onto the app event channel.
    pub fn asset_events(mut assets: ResMut<Self>, mut events: EventWriter<AssetEvent<A>>) {
        events.write_batch(assets.queued_events.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_destruct_invalidates_weak_handles() {
        let mut assets = Assets::<String>::default();
        let handle = assets.add("Hello Assets!".to_string());
        let weak = handle.weak();
        assert!(assets.get(weak.id()).is_some());
        drop(handle);
        assets.handle_events_manual();
        assert!(assets.get(weak.id()).is_none());
    }

    #[test]
    fn multiple_strong_handles_keep_the_asset_alive() {
        let mut assets = Assets::<String>::default();
        let first = assets.add("shared".to_string());
        let second = assets.get_strong_handle(first.id()).unwrap();
        drop(first);
        assets.handle_events_manual();
        assert!(assets.get(second.id()).is_some());
        drop(second);
        assets.handle_events_manual();
        let weak = AssetId::from(AssetIndex::new(0, 0));
        assert!(assets.get(weak).is_none());
    }

    #[test]
    fn dropped_index_is_recycled_with_bumped_generation() {
        let mut assets = Assets::<String>::default();
        let first = assets.add("first".to_string());
        let AssetId::Index { index: index1, .. } = first.id() else {
            panic!("expected an index id");
        };
        drop(first);
        assets.handle_events_manual();
        let second = assets.add("second".to_string());
        let AssetId::Index { index: index2, .. } = second.id() else {
            panic!("expected an index id");
        };
        assert_eq!(index1.index(), index2.index());
        assert_eq!(index1.generation() + 1, index2.generation());
    }

    #[test]
    fn force_remove_keeps_the_slot_insertable() {
        let mut assets = Assets::<String>::default();
        let handle = assets.add("old".to_string());
        assert!(assets.remove(handle.id()).is_some());
        assert!(assets.get(handle.id()).is_none());

        let result = assets.insert(handle.id(), "new".to_string());
        assert_eq!(result, Ok(false), "slot was empty after forced removal");
        assert_eq!(assets.try_get(handle.id()).unwrap(), "new");
        let AssetId::Index { index, .. } = handle.id() else {
            panic!("expected an index id");
        };
        assert_eq!(index.generation(), 0, "generation unchanged by remove");
    }

    #[test]
    fn reserved_handles_accept_insertion() {
        let mut assets = Assets::<String>::default();
        let handle = assets.reserve_handle();
        assert!(assets.get(handle.id()).is_none());
        assert_eq!(assets.insert(handle.id(), "value".to_string()), Ok(false));
        assert_eq!(assets.get(handle.id()).unwrap(), "value");
    }

    #[test]
    fn stale_generation_insert_fails() {
        let mut assets = Assets::<String>::default();
        let first = assets.add("first".to_string());
        let stale = first.id();
        drop(first);
        assets.handle_events_manual();
        let _second = assets.add("second".to_string());
        let error = assets.insert(stale, "stale".to_string()).unwrap_err();
        assert!(matches!(error, InvalidGenerationError::Occupied { .. }));
    }

    #[test]
    fn events_are_queued_in_order() {
        let mut assets = Assets::<String>::default();
        let handle = assets.add("value".to_string());
        assets.get_mut(handle.id());
        assets.remove(handle.id());
        let kinds: Vec<_> = assets
            .queued_events
            .iter()
            .map(|event| match event {
                AssetEvent::Added { .. } => "added",
                AssetEvent::Modified { .. } => "modified",
                AssetEvent::Removed { .. } => "removed",
                AssetEvent::Unused { .. } => "unused",
                AssetEvent::LoadedWithDependencies { .. } => "loaded",
            })
            .collect();
        assert_eq!(kinds, vec!["added", "modified", "removed"]);
    }
}
