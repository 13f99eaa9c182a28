use fxhash::FxHashMap;

use crate::{
    component::{ComponentId, ComponentInfo},
    entity::Entity,
    storage::blob_vec::BlobVec,
    tick::{ComponentTicks, Tick, TickCell},
};

/// Storage for one `SparseSet`-class component: a dense value array plus a
/// sparse entity-index -> dense-index map. Insert, remove and lookup are
/// O(1) and never trigger an archetype move of the dense values.
pub struct ComponentSparseSet {
    dense: BlobVec,
    added_ticks: Vec<TickCell>,
    changed_ticks: Vec<TickCell>,
    entities: Vec<Entity>,
    sparse: Vec<Option<u32>>,
}

impl ComponentSparseSet {
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            dense: BlobVec::new(info.layout(), info.drop()),
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
            entities: Vec::new(),
            sparse: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    fn dense_index_of(&self, entity: Entity) -> Option<usize> {
        let dense = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.entities[dense] == entity).then_some(dense)
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index_of(entity).is_some()
    }

    /// Inserts (or replaces) the value for `entity`.
    ///
    /// # Safety
    /// `value` must own a value of the set's component type; caller forgets
    /// it afterwards.
    pub unsafe fn insert(&mut self, entity: Entity, value: *const u8, change_tick: Tick) {
        if let Some(dense) = self.dense_index_of(entity) {
            self.dense.replace(dense, value);
            self.changed_ticks[dense].set(change_tick);
            return;
        }
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        self.sparse[index] = Some(self.entities.len() as u32);
        self.entities.push(entity);
        self.dense.push(value);
        self.added_ticks.push(TickCell::new(change_tick));
        self.changed_ticks.push(TickCell::new(change_tick));
    }

    /// Removes and drops the value for `entity`. Returns whether a value was
    /// present.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let Some(dense) = self.dense_index_of(entity) else {
            return false;
        };
        self.sparse[entity.index() as usize] = None;
        // SAFETY: dense index resolved above.
        unsafe { self.dense.swap_remove_and_drop(dense) };
        self.added_ticks.swap_remove(dense);
        self.changed_ticks.swap_remove(dense);
        let is_last = dense == self.entities.len() - 1;
        self.entities.swap_remove(dense);
        if !is_last {
            let moved = self.entities[dense];
            self.sparse[moved.index() as usize] = Some(dense as u32);
        }
        true
    }

    /// Returns a raw pointer to the value for `entity`. Writes through the
    /// pointer require access proven by the dispatcher.
    pub fn get_ptr(&self, entity: Entity) -> Option<*mut u8> {
        let dense = self.dense_index_of(entity)?;
        // SAFETY: dense index is in bounds by construction.
        Some(unsafe { self.dense.get_ptr(dense) })
    }

    pub fn get_ticks(&self, entity: Entity) -> Option<ComponentTicks> {
        let dense = self.dense_index_of(entity)?;
        // SAFETY: slot is live; shared tick reads are allowed under the
        // dispatcher's discipline.
        unsafe {
            Some(ComponentTicks {
                added: self.added_ticks[dense].read(),
                changed: self.changed_ticks[dense].read(),
            })
        }
    }

    /// The `(added, changed)` tick cells for `entity`'s slot.
    pub fn tick_cells(&self, entity: Entity) -> Option<(&TickCell, &TickCell)> {
        let dense = self.dense_index_of(entity)?;
        Some((&self.added_ticks[dense], &self.changed_ticks[dense]))
    }

    /// # Safety
    /// Requires proven write access to this component for `entity`.
    pub unsafe fn set_changed(&self, entity: Entity, change_tick: Tick) {
        if let Some(dense) = self.dense_index_of(entity) {
            self.changed_ticks[dense].set(change_tick);
        }
    }

    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for tick in &mut self.added_ticks {
            tick.get_mut().check_tick(change_tick);
        }
        for tick in &mut self.changed_ticks {
            tick.get_mut().check_tick(change_tick);
        }
    }
}

/// All sparse-set component storages, keyed by [`ComponentId`].
#[derive(Default)]
pub struct SparseSets {
    sets: FxHashMap<ComponentId, ComponentSparseSet>,
}

impl SparseSets {
    pub fn get(&self, component_id: ComponentId) -> Option<&ComponentSparseSet> {
        self.sets.get(&component_id)
    }

    pub fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(&component_id)
    }

    pub fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        self.sets
            .entry(info.id())
            .or_insert_with(|| ComponentSparseSet::new(info))
    }

    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for set in self.sets.values_mut() {
            set.check_change_ticks(change_tick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, TypeRegistry};

    #[derive(Debug, PartialEq)]
    struct Marker(u32);
    impl Component for Marker {
        const STORAGE_TYPE: crate::component::StorageType =
            crate::component::StorageType::SparseSet;
    }

    fn set_for_marker(registry: &TypeRegistry) -> ComponentSparseSet {
        let id = registry.register_component::<Marker>();
        ComponentSparseSet::new(registry.info(id).unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let registry = TypeRegistry::default();
        let mut set = set_for_marker(&registry);
        let e = Entity::from_raw(3);
        let value = Marker(7);
        unsafe {
            set.insert(e, &value as *const Marker as *const u8, Tick::new(1));
        }
        std::mem::forget(value);
        assert!(set.contains(e));
        let ptr = set.get_ptr(e).unwrap();
        assert_eq!(unsafe { &*ptr.cast::<Marker>() }, &Marker(7));
        assert!(set.remove(e));
        assert!(!set.contains(e));
        assert!(!set.remove(e));
    }

    #[test]
    fn stale_generation_misses() {
        let registry = TypeRegistry::default();
        let mut set = set_for_marker(&registry);
        let old = Entity::from_parts(0, 0);
        let new = Entity::from_parts(0, 1);
        let value = Marker(1);
        unsafe {
            set.insert(new, &value as *const Marker as *const u8, Tick::new(1));
        }
        std::mem::forget(value);
        assert!(set.contains(new));
        assert!(!set.contains(old));
        assert!(set.get_ptr(old).is_none());
    }

    #[test]
    fn swap_remove_fixes_sparse_links() {
        let registry = TypeRegistry::default();
        let mut set = set_for_marker(&registry);
        for i in 0..4 {
            let value = Marker(i);
            unsafe {
                set.insert(
                    Entity::from_raw(i),
                    &value as *const Marker as *const u8,
                    Tick::new(1),
                );
            }
            std::mem::forget(value);
        }
        set.remove(Entity::from_raw(0));
        // Entity 3 was swapped into the vacated dense slot; it must still
        // resolve.
        let ptr = set.get_ptr(Entity::from_raw(3)).unwrap();
        assert_eq!(unsafe { &*ptr.cast::<Marker>() }, &Marker(3));
    }
}
