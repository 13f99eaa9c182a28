mod entity_ref;
mod unsafe_world_cell;

pub use entity_ref::{EntityRef, EntityWorldMut};
pub use unsafe_world_cell::UnsafeWorldCell;

use std::any::TypeId;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    archetype::{ArchetypeId, Archetypes},
    bundle::Bundle,
    change_detection::{Mut, Res, ResMut, TicksMut},
    command::CommandQueue,
    component::{Component, ComponentId, Resource, StorageType, TypeRegistry},
    entity::{Entities, Entity, EntityLocation},
    error::EcsError,
    event::Events,
    query::{QueryData, QueryFilter, QueryState},
    resource::Resources,
    storage::Storages,
    tick::{ComponentTicks, Tick, CHECK_TICK_THRESHOLD},
};

/// The aggregate of entities, components, resources, events and command
/// queues, together with the monotonic change-tick counter everything else
/// timestamps against.
///
/// The world owns all of its parts; systems receive short-lived views whose
/// lifetimes are bounded by their dispatch slot.
#[derive(Default)]
pub struct World {
    registry: TypeRegistry,
    entities: Entities,
    archetypes: Archetypes,
    storages: Storages,
    resources: Resources,
    command_queue: CommandQueue,
    change_tick: AtomicU32,
    last_change_tick: Tick,
    last_check_tick: Tick,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    #[inline]
    pub(crate) fn entities_mut(&mut self) -> &mut Entities {
        &mut self.entities
    }

    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    #[inline]
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    #[inline]
    pub(crate) fn storages_mut(&mut self) -> &mut Storages {
        &mut self.storages
    }

    #[inline]
    pub(crate) fn archetypes_mut(&mut self) -> &mut Archetypes {
        &mut self.archetypes
    }

    /// Splits disjoint borrows of the registry and storage for routines that
    /// need descriptor lookups while mutating columns.
    #[inline]
    pub(crate) fn registry_and_storages(&mut self) -> (&TypeRegistry, &mut Storages) {
        (&self.registry, &mut self.storages)
    }

    #[inline]
    pub(crate) fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        self.registry.register_component::<T>()
    }

    // ---- entities ----------------------------------------------------------

    /// Spawns an entity with no components.
    pub fn spawn_empty(&mut self) -> EntityWorldMut<'_> {
        self.flush_entities();
        let entity = self.entities.alloc();
        let location = self.place_in_empty_archetype(entity);
        self.entities.set(entity.index(), location);
        EntityWorldMut::new(self, entity, location)
    }

    /// Spawns an entity with the given bundle of components.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityWorldMut<'_> {
        let mut entity_mut = self.spawn_empty();
        entity_mut.insert(bundle);
        entity_mut
    }

    /// Despawns `entity` if it is alive; returns whether it was.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        match self.get_entity_mut(entity) {
            Some(entity_mut) => {
                entity_mut.despawn();
                true
            }
            None => false,
        }
    }

    pub fn entity_mut(&mut self, entity: Entity) -> EntityWorldMut<'_> {
        self.get_entity_mut(entity)
            .unwrap_or_else(|| panic!("entity {entity:?} does not exist"))
    }

    pub fn get_entity_mut(&mut self, entity: Entity) -> Option<EntityWorldMut<'_>> {
        let location = self.entities.get(entity)?;
        Some(EntityWorldMut::new(self, entity, location))
    }

    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        self.get_entity(entity)
            .unwrap_or_else(|| panic!("entity {entity:?} does not exist"))
    }

    pub fn get_entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        let location = self.entities.get(entity)?;
        Some(EntityRef::new(self, entity, location))
    }

    #[inline]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    fn place_in_empty_archetype(&mut self, entity: Entity) -> EntityLocation {
        let archetype = self
            .archetypes
            .get_mut(ArchetypeId::EMPTY)
            .expect("empty archetype always exists");
        let row = archetype.allocate(entity);
        let table = self
            .storages
            .tables
            .get_mut(archetype.table_id())
            .expect("empty table always exists");
        let table_row = table.allocate(entity);
        debug_assert_eq!(row, table_row);
        EntityLocation {
            archetype_id: ArchetypeId::EMPTY,
            archetype_row: row,
            table_id: archetype.table_id(),
            table_row,
        }
    }

    /// Materializes entities reserved through [`Entities::reserve_entity`]
    /// into the empty archetype.
    pub fn flush_entities(&mut self) {
        if !self.entities.needs_flush() {
            return;
        }
        let mut placements = Vec::new();
        self.entities.flush(|entity, location| {
            // Placement mutates archetypes, which we cannot touch from
            // inside the entities borrow; record and fix up after.
            *location = EntityLocation::INVALID;
            placements.push(entity);
        });
        for entity in placements {
            let location = self.place_in_empty_archetype(entity);
            self.entities.set(entity.index(), location);
        }
    }

    /// Applies the world's own command queue and any flushed entities.
    pub fn flush(&mut self) {
        self.flush_entities();
        let mut queue = std::mem::take(&mut self.command_queue);
        queue.apply(self);
        // Commands queued while applying land in the fresh queue; loop until
        // quiescent.
        while !self.command_queue.is_empty() {
            let mut queue = std::mem::take(&mut self.command_queue);
            queue.apply(self);
        }
    }

    /// A command builder writing into the world's own queue; applied on the
    /// next [`flush`](Self::flush).
    pub fn commands(&mut self) -> crate::command::Commands<'_, '_> {
        let World {
            command_queue,
            entities,
            ..
        } = self;
        crate::command::Commands::new(command_queue, entities)
    }

    // ---- components --------------------------------------------------------

    /// Reads component `T` of `entity`.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        let location = self.entities.get(entity)?;
        let id = self.registry.component_id::<T>()?;
        let ptr = self.component_ptr(entity, location, id, T::STORAGE_TYPE)?;
        // SAFETY: `&self` guarantees no concurrent exclusive borrow through
        // safe APIs; typed by registration.
        Some(unsafe { &*ptr.cast::<T>() })
    }

    /// Mutably borrows component `T` of `entity`, with change detection.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<Mut<'_, T>> {
        let location = self.entities.get(entity)?;
        let id = self.registry.component_id::<T>()?;
        let last_run = self.last_change_tick;
        let this_run = self.read_change_tick();
        // SAFETY: `&mut self` is exclusive access to all storage.
        unsafe { self.get_mut_by_id(entity, location, id, T::STORAGE_TYPE, last_run, this_run) }
    }

    /// # Safety
    /// Caller must have exclusive access to the component slot.
    pub(crate) unsafe fn get_mut_by_id<T: Component>(
        &self,
        entity: Entity,
        location: EntityLocation,
        id: ComponentId,
        storage_type: StorageType,
        last_run: Tick,
        this_run: Tick,
    ) -> Option<Mut<'_, T>> {
        let (ptr, added, changed) = match storage_type {
            StorageType::Table => {
                let table = self.storages.tables.get(location.table_id)?;
                let column = table.get_column(id)?;
                let (added, changed) = column.tick_cells(location.table_row);
                (column.get_ptr(location.table_row), added, changed)
            }
            StorageType::SparseSet => {
                let set = self.storages.sparse_sets.get(id)?;
                let ptr = set.get_ptr(entity)?;
                let (added, changed) = set.tick_cells(entity)?;
                (ptr, added, changed)
            }
        };
        Some(Mut {
            value: &mut *ptr.cast::<T>(),
            ticks: TicksMut {
                added,
                changed,
                last_run,
                this_run,
            },
        })
    }

    pub(crate) fn component_ptr(
        &self,
        entity: Entity,
        location: EntityLocation,
        id: ComponentId,
        storage_type: StorageType,
    ) -> Option<*mut u8> {
        match storage_type {
            StorageType::Table => {
                let table = self.storages.tables.get(location.table_id)?;
                let column = table.get_column(id)?;
                // SAFETY: locations are kept in sync with table rows.
                Some(unsafe { column.get_ptr(location.table_row) })
            }
            StorageType::SparseSet => self.storages.sparse_sets.get(id)?.get_ptr(entity),
        }
    }

    pub(crate) fn component_ticks(
        &self,
        entity: Entity,
        location: EntityLocation,
        id: ComponentId,
        storage_type: StorageType,
    ) -> Option<ComponentTicks> {
        match storage_type {
            StorageType::Table => {
                let table = self.storages.tables.get(location.table_id)?;
                let column = table.get_column(id)?;
                // SAFETY: row is in bounds for a live location.
                Some(unsafe { column.get_ticks(location.table_row) })
            }
            StorageType::SparseSet => self.storages.sparse_sets.get(id)?.get_ticks(entity),
        }
    }

    // ---- archetype moves (used by EntityWorldMut and commands) -------------

    /// Finds or creates the archetype for exactly `components` (sorted,
    /// deduplicated).
    pub(crate) fn intern_archetype(&mut self, components: Vec<ComponentId>) -> ArchetypeId {
        if let Some(id) = self.archetypes.get_id(&components) {
            return id;
        }
        let registry = &self.registry;
        let (table_components, sparse_set_components) =
            Archetypes::split_by_storage(&components, |id| {
                registry
                    .info(id)
                    .expect("component registered before archetype creation")
                    .storage_type()
            });
        let table_id = self.storages.tables.get_id_or_insert(
            &components,
            &table_components,
            |id| registry.info(id).expect("registered"),
        );
        self.archetypes
            .insert(components, table_id, table_components, sparse_set_components)
    }

    /// Moves `entity` from its current archetype to `target`, transferring
    /// shared table columns (values and ticks), dropping source-only ones,
    /// and fixing the location of any entity swapped into the vacated row.
    ///
    /// Target-only table columns are left for the caller to initialize at
    /// the returned location's row.
    pub(crate) fn move_entity_to_archetype(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        target: ArchetypeId,
    ) -> EntityLocation {
        debug_assert_ne!(location.archetype_id, target);
        let target_table_id = self.archetypes.get(target).expect("target interned").table_id();

        let (source_table, target_table) = self
            .storages
            .tables
            .get_2_mut(location.table_id, target_table_id);
        let move_result = source_table.move_to(location.table_row, target_table);

        let source_arch = self
            .archetypes
            .get_mut(location.archetype_id)
            .expect("source archetype exists");
        let swapped = source_arch.swap_remove(location.archetype_row);
        debug_assert_eq!(swapped, move_result.swapped_entity);
        if let Some(swapped_entity) = swapped {
            let mut swapped_location = self
                .entities
                .get(swapped_entity)
                .expect("swapped entity is alive");
            swapped_location.archetype_row = location.archetype_row;
            swapped_location.table_row = location.table_row;
            self.entities.set(swapped_entity.index(), swapped_location);
        }

        let target_arch = self.archetypes.get_mut(target).expect("target interned");
        let archetype_row = target_arch.allocate(entity);
        debug_assert_eq!(archetype_row, move_result.new_row);
        let new_location = EntityLocation {
            archetype_id: target,
            archetype_row,
            table_id: target_table_id,
            table_row: move_result.new_row,
        };
        self.entities.set(entity.index(), new_location);
        new_location
    }

    // ---- resources ---------------------------------------------------------

    pub fn insert_resource<T: Resource>(&mut self, value: T) {
        let id = self.registry.register_resource::<T>();
        self.resources.insert(id, value);
    }

    pub fn init_resource<T: Resource + Default>(&mut self) {
        if !self.contains_resource::<T>() {
            self.insert_resource(T::default());
        }
    }

    pub fn remove_resource<T: Resource>(&mut self) -> Option<T> {
        let id = self.registry.resource_id::<T>()?;
        self.resources.remove(id)
    }

    pub fn contains_resource<T: Resource>(&self) -> bool {
        self.registry
            .resource_id::<T>()
            .is_some_and(|id| self.resources.contains(id))
    }

    pub fn get_resource<T: Resource>(&self) -> Option<Res<'_, T>> {
        let id = self.registry.resource_id::<T>()?;
        self.resources.get(id)
    }

    pub fn get_resource_mut<T: Resource>(&self) -> Option<ResMut<'_, T>> {
        let id = self.registry.resource_id::<T>()?;
        self.resources.get_mut(id)
    }

    #[track_caller]
    pub fn resource<T: Resource>(&self) -> Res<'_, T> {
        self.get_resource::<T>().unwrap_or_else(|| {
            panic!(
                "requested resource `{}` does not exist in the world",
                std::any::type_name::<T>()
            )
        })
    }

    #[track_caller]
    pub fn resource_mut<T: Resource>(&self) -> ResMut<'_, T> {
        self.get_resource_mut::<T>().unwrap_or_else(|| {
            panic!(
                "requested resource `{}` does not exist in the world",
                std::any::type_name::<T>()
            )
        })
    }

    /// Temporarily removes resource `T`, runs `f` with full world access plus
    /// the value, then puts the value back.
    ///
    /// Re-entrant for disjoint resource types; calling it for the same type
    /// inside `f` yields [`EcsError::ResourceMissing`].
    pub fn resource_scope<T: Resource, R>(
        &mut self,
        f: impl FnOnce(&mut World, &mut T) -> R,
    ) -> Result<R, EcsError> {
        let id = self
            .registry
            .get_resource_id(TypeId::of::<T>())
            .ok_or_else(|| EcsError::ResourceMissing {
                name: std::any::type_name::<T>().to_string(),
            })?;
        let mut value: T =
            self.resources
                .remove(id)
                .ok_or_else(|| EcsError::ResourceMissing {
                    name: std::any::type_name::<T>().to_string(),
                })?;
        let result = f(self, &mut value);
        self.resources.insert(id, value);
        Ok(result)
    }

    // ---- events ------------------------------------------------------------

    /// Sends an event, initializing the `Events<T>` resource if needed.
    pub fn send_event<T: Send + Sync + 'static>(&mut self, event: T) {
        let id = self.registry.register_resource::<Events<T>>();
        if !self.resources.contains(id) {
            self.resources.insert(id, Events::<T>::default());
        }
        if let Some(events) = self.resources.get_exclusive::<Events<T>>(id) {
            events.send(event);
        }
    }

    // ---- queries -----------------------------------------------------------

    pub fn query<D: QueryData>(&mut self) -> QueryState<D, ()> {
        self.query_filtered::<D, ()>()
    }

    pub fn query_filtered<D: QueryData, F: QueryFilter>(&mut self) -> QueryState<D, F> {
        QueryState::new(self)
    }

    // ---- change ticks ------------------------------------------------------

    /// Atomically advances the change tick and returns the new value. Safe
    /// to call from concurrently running systems.
    #[inline]
    pub fn increment_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.fetch_add(1, Ordering::AcqRel).wrapping_add(1))
    }

    #[inline]
    pub fn read_change_tick(&self) -> Tick {
        Tick::new(self.change_tick.load(Ordering::Acquire))
    }

    #[inline]
    pub fn last_change_tick(&self) -> Tick {
        self.last_change_tick
    }

    /// Marks the point separating "this frame" from "previous frames" for
    /// direct world access.
    pub fn clear_trackers(&mut self) {
        self.last_change_tick = self.read_change_tick();
    }

    /// Clamps stored ticks when the counter approaches wraparound. Returns
    /// the tick the scan ran at, if one ran; callers holding tick state of
    /// their own (e.g. schedules) should clamp against it too.
    pub fn check_change_ticks(&mut self) -> Option<Tick> {
        let change_tick = self.read_change_tick();
        if change_tick.relative_to(self.last_check_tick) < CHECK_TICK_THRESHOLD {
            return None;
        }
        self.storages.check_change_ticks(change_tick);
        self.last_check_tick = change_tick;
        Some(change_tick)
    }

    /// Clears all entities and storage while keeping registrations and
    /// resources.
    pub fn clear_entities(&mut self) {
        self.storages = Storages::default();
        self.archetypes = Archetypes::default();
        self.entities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, PartialEq)]
    struct Velocity(f32);
    impl Component for Velocity {}

    #[derive(Debug, PartialEq, Default)]
    struct Score(u32);
    impl Resource for Score {}

    #[test]
    fn spawn_insert_get() {
        let mut world = World::new();
        let entity = world.spawn(Position { x: 1.0, y: 2.0 }).id();
        assert_eq!(
            world.get::<Position>(entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert_eq!(world.get::<Velocity>(entity), None);

        world.entity_mut(entity).insert(Velocity(3.0));
        assert_eq!(world.get::<Velocity>(entity), Some(&Velocity(3.0)));
        // The move must have preserved the earlier component.
        assert_eq!(
            world.get::<Position>(entity),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn despawn_removes_everything() {
        let mut world = World::new();
        let a = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity(1.0))).id();
        let b = world.spawn((Position { x: 5.0, y: 5.0 }, Velocity(2.0))).id();
        assert!(world.despawn(a));
        assert!(!world.contains_entity(a));
        assert!(!world.despawn(a));
        // The swap-removed survivor keeps its data.
        assert_eq!(world.get::<Velocity>(b), Some(&Velocity(2.0)));
    }

    #[test]
    fn storage_matches_archetype_membership() {
        let mut world = World::new();
        let mut spawned = Vec::new();
        for i in 0..32 {
            let entity = if i % 3 == 0 {
                world.spawn(Position { x: i as f32, y: 0.0 }).id()
            } else if i % 3 == 1 {
                world.spawn((Position { x: i as f32, y: 0.0 }, Velocity(i as f32))).id()
            } else {
                world.spawn(Velocity(i as f32)).id()
            };
            spawned.push(entity);
        }
        let position_id = world.registry().component_id::<Position>().unwrap();
        for &entity in &spawned {
            let location = world.entities().get(entity).unwrap();
            let archetype = world.archetypes().get(location.archetype_id).unwrap();
            assert_eq!(
                archetype.contains(position_id),
                world.get::<Position>(entity).is_some()
            );
        }
    }

    #[test]
    fn last_write_wins() {
        let mut world = World::new();
        let entity = world.spawn(Position { x: 0.0, y: 0.0 }).id();
        world.get_mut::<Position>(entity).unwrap().x = 10.0;
        world.get_mut::<Position>(entity).unwrap().x = 20.0;
        assert_eq!(world.get::<Position>(entity).unwrap().x, 20.0);
    }

    #[test]
    fn change_ticks_recorded_on_insert_and_write() {
        let mut world = World::new();
        let entity = world.spawn(Position { x: 0.0, y: 0.0 }).id();
        let id = world.registry().component_id::<Position>().unwrap();
        let location = world.entities().get(entity).unwrap();
        let ticks = world
            .component_ticks(entity, location, id, StorageType::Table)
            .unwrap();
        assert_eq!(ticks.added, ticks.changed);

        world.increment_change_tick();
        let before = world.read_change_tick();
        world.get_mut::<Position>(entity).unwrap().x = 1.0;
        let location = world.entities().get(entity).unwrap();
        let ticks = world
            .component_ticks(entity, location, id, StorageType::Table)
            .unwrap();
        assert_eq!(ticks.changed, before);
        assert!(ticks.changed > ticks.added);
    }

    #[test]
    fn resource_scope_takes_and_restores() {
        let mut world = World::new();
        world.insert_resource(Score(1));
        let out = world
            .resource_scope::<Score, _>(|world, score| {
                score.0 += 1;
                // The resource is absent inside the scope.
                assert!(world.get_resource::<Score>().is_none());
                // Nested scopes for other types still work.
                world.insert_resource(42u32);
                score.0
            })
            .unwrap();
        assert_eq!(out, 2);
        assert_eq!(world.resource::<Score>().0, 2);
        let missing = world.resource_scope::<String, _>(|_, _| ());
        assert!(matches!(missing, Err(EcsError::ResourceMissing { .. })));
    }

    impl Resource for u32 {}
    impl Resource for String {}
}
