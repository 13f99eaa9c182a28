use crate::{
    bundle::Bundle,
    change_detection::Mut,
    component::{Component, ComponentId, StorageType},
    entity::{Entity, EntityLocation},
    tick::ComponentTicks,
    world::World,
};

/// A read-only view of one entity and its components.
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
    location: EntityLocation,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: Entity, location: EntityLocation) -> Self {
        Self {
            world,
            entity,
            location,
        }
    }

    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    #[inline]
    pub fn location(&self) -> EntityLocation {
        self.location
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.contains_id(
            match self.world.registry().component_id::<T>() {
                Some(id) => id,
                None => return false,
            },
        )
    }

    pub fn contains_id(&self, component_id: ComponentId) -> bool {
        self.world
            .archetypes()
            .get(self.location.archetype_id)
            .is_some_and(|archetype| archetype.contains(component_id))
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get(self.entity)
    }
}

/// An exclusive view of one entity, able to add and remove components and to
/// despawn it.
pub struct EntityWorldMut<'w> {
    world: &'w mut World,
    entity: Entity,
    location: EntityLocation,
}

impl<'w> EntityWorldMut<'w> {
    pub(crate) fn new(world: &'w mut World, entity: Entity, location: EntityLocation) -> Self {
        Self {
            world,
            entity,
            location,
        }
    }

    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    #[inline]
    pub fn location(&self) -> EntityLocation {
        self.location
    }

    pub fn contains<T: Component>(&self) -> bool {
        let Some(id) = self.world.registry().component_id::<T>() else {
            return false;
        };
        self.world
            .archetypes()
            .get(self.location.archetype_id)
            .is_some_and(|archetype| archetype.contains(id))
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.world.get(self.entity)
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<Mut<'_, T>> {
        self.world.get_mut(self.entity)
    }

    /// Inserts the bundle's components, moving the entity to the matching
    /// archetype. Components the entity already has are replaced in place
    /// (bumping their changed tick); new ones record the current tick as
    /// both added and changed.
    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        let change_tick = self.world.read_change_tick();
        let mut bundle_ids = Vec::new();
        B::component_ids(self.world.registry(), &mut bundle_ids);

        // Single-component inserts hit the memoized archetype edge.
        let cached_target = match bundle_ids.as_slice() {
            &[id] => self
                .world
                .archetypes()
                .get(self.location.archetype_id)
                .expect("entity archetype exists")
                .edges()
                .get_add(id),
            _ => None,
        };
        let target = cached_target.unwrap_or_else(|| {
            let current = self
                .world
                .archetypes()
                .get(self.location.archetype_id)
                .expect("entity archetype exists");
            let mut new_components = current.components().to_vec();
            for &id in &bundle_ids {
                if let Err(pos) = new_components.binary_search(&id) {
                    new_components.insert(pos, id);
                }
            }
            let target = self.world.intern_archetype(new_components);
            if let [id] = bundle_ids.as_slice() {
                self.world
                    .archetypes_mut()
                    .get_mut(self.location.archetype_id)
                    .expect("entity archetype exists")
                    .edges_mut()
                    .cache_add(*id, target);
            }
            target
        });

        let location = if target == self.location.archetype_id {
            self.location
        } else {
            self.world
                .move_entity_to_archetype(self.entity, self.location, target)
        };
        self.location = location;

        // Route each bundle value into its column or sparse set. A target
        // column that did not receive a moved value still has its length at
        // the new row, which distinguishes push from replace.
        let entity = self.entity;
        let (registry, storages) = self.world.registry_and_storages();
        let mut index = 0;
        bundle.get_components(&mut |value| {
            let id = bundle_ids[index];
            index += 1;
            let info = registry.info(id).expect("bundle component registered");
            match info.storage_type() {
                StorageType::Table => {
                    let table = storages
                        .tables
                        .get_mut(location.table_id)
                        .expect("location table exists");
                    let column = table
                        .get_column_mut(id)
                        .expect("target archetype has bundle column");
                    // SAFETY: ownership of `value` is transferred here; row
                    // bounds follow from the location invariant.
                    unsafe {
                        if column.len() == location.table_row {
                            column.push(value, ComponentTicks::new(change_tick));
                        } else {
                            column.replace(location.table_row, value, change_tick);
                        }
                    }
                }
                StorageType::SparseSet => {
                    let set = storages.sparse_sets.get_or_insert(info);
                    // SAFETY: ownership of `value` is transferred here.
                    unsafe { set.insert(entity, value, change_tick) };
                }
            }
        });
        self
    }

    /// Removes the bundle's components (dropping their values) and moves the
    /// entity to the shrunken archetype. Components the entity does not have
    /// are ignored.
    pub fn remove<B: Bundle>(&mut self) -> &mut Self {
        let mut bundle_ids = Vec::new();
        B::component_ids(self.world.registry(), &mut bundle_ids);

        let archetype = self
            .world
            .archetypes()
            .get(self.location.archetype_id)
            .expect("entity archetype exists");
        let current_components = archetype.components().to_vec();

        let cached_target = match bundle_ids.as_slice() {
            &[id] => archetype.edges().get_remove(id),
            _ => None,
        };
        let target = cached_target.unwrap_or_else(|| {
            let mut new_components = current_components.clone();
            new_components.retain(|id| !bundle_ids.contains(id));
            let target = self.world.intern_archetype(new_components);
            if let [id] = bundle_ids.as_slice() {
                self.world
                    .archetypes_mut()
                    .get_mut(self.location.archetype_id)
                    .expect("entity archetype exists")
                    .edges_mut()
                    .cache_remove(*id, target);
            }
            target
        });
        if target == self.location.archetype_id {
            return self;
        }

        // Sparse-set values are keyed by entity, not by archetype; drop the
        // removed ones explicitly.
        for &id in &bundle_ids {
            let is_sparse = self
                .world
                .registry()
                .info(id)
                .is_some_and(|info| info.storage_type() == StorageType::SparseSet);
            if is_sparse && current_components.binary_search(&id).is_ok() {
                if let Some(set) = self.world.storages_mut().sparse_sets.get_mut(id) {
                    set.remove(self.entity);
                }
            }
        }

        self.location = self
            .world
            .move_entity_to_archetype(self.entity, self.location, target);
        self
    }

    /// Removes the entity and drops all of its components.
    pub fn despawn(self) {
        let entity = self.entity;
        let location = self.location;

        let sparse_components: Vec<ComponentId> = self
            .world
            .archetypes()
            .get(location.archetype_id)
            .expect("entity archetype exists")
            .sparse_set_components()
            .to_vec();
        for id in sparse_components {
            if let Some(set) = self.world.storages_mut().sparse_sets.get_mut(id) {
                set.remove(entity);
            }
        }

        let table = self
            .world
            .storages_mut()
            .tables
            .get_mut(location.table_id)
            .expect("location table exists");
        let table_swapped = table.swap_remove(location.table_row);
        let archetype = self
            .world
            .archetypes_mut()
            .get_mut(location.archetype_id)
            .expect("entity archetype exists");
        let swapped = archetype.swap_remove(location.archetype_row);
        debug_assert_eq!(swapped, table_swapped);
        if let Some(swapped_entity) = swapped {
            let mut swapped_location = self
                .world
                .entities()
                .get(swapped_entity)
                .expect("swapped entity is alive");
            swapped_location.archetype_row = location.archetype_row;
            swapped_location.table_row = location.table_row;
            self.world
                .entities_mut()
                .set(swapped_entity.index(), swapped_location);
        }
        self.world.entities_mut().free(entity);
    }
}
