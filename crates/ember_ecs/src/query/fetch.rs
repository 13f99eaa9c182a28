use std::marker::PhantomData;

use crate::{
    archetype::Archetype,
    change_detection::Mut,
    component::{Component, ComponentId},
    entity::{Entity, EntityLocation},
    query::access::FilteredAccess,
    tick::Tick,
    world::World,
};

/// Describes what a query fetches per matching entity.
///
/// # Safety
/// `update_component_access` must declare every component the `fetch`
/// implementation touches, with the correct read/write level; `fetch` may
/// only be called for entities of archetypes accepted by
/// `matches_archetype`.
pub unsafe trait QueryData {
    /// The value produced per entity.
    type Item<'w>;
    type State: Send + Sync + Clone + 'static;

    fn init_state(world: &mut World) -> Self::State;
    fn update_component_access(state: &Self::State, access: &mut FilteredAccess);
    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool;

    /// # Safety
    /// The declared access must have been validated against all concurrently
    /// running systems, and `location` must be `entity`'s current location.
    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w>;
}

/// Marker for query data that never writes; required for shared iteration.
///
/// # Safety
/// The implementation's `fetch` must not perform any writes.
pub unsafe trait ReadOnlyQueryData: QueryData {}

pub struct ComponentState<T> {
    id: ComponentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ComponentState<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Component> ComponentState<T> {
    fn new(world: &mut World) -> Self {
        Self {
            id: world.register_component::<T>(),
            _marker: PhantomData,
        }
    }
}

// SAFETY: declares a read of T and only reads T.
unsafe impl<T: Component> QueryData for &T {
    type Item<'w> = &'w T;
    type State = ComponentState<T>;

    fn init_state(world: &mut World) -> Self::State {
        ComponentState::new(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_write(state.id),
            "&{0} conflicts with a previous `&mut {0}` in the same query",
            std::any::type_name::<T>()
        );
        access.add_component_read(state.id);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(state.id)
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        let ptr = world
            .component_ptr(entity, location, state.id, T::STORAGE_TYPE)
            .expect("matched archetype contains the component");
        &*ptr.cast::<T>()
    }
}

// SAFETY: `&T` fetches never write.
unsafe impl<T: Component> ReadOnlyQueryData for &T {}

// SAFETY: declares a write of T; fetch hands out a tick-tracked exclusive
// borrow.
unsafe impl<T: Component> QueryData for &mut T {
    type Item<'w> = Mut<'w, T>;
    type State = ComponentState<T>;

    fn init_state(world: &mut World) -> Self::State {
        ComponentState::new(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_read(state.id),
            "&mut {0} conflicts with a previous access of {0} in the same query",
            std::any::type_name::<T>()
        );
        access.add_component_write(state.id);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(state.id)
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        world
            .get_mut_by_id::<T>(entity, location, state.id, T::STORAGE_TYPE, last_run, this_run)
            .expect("matched archetype contains the component")
    }
}

// SAFETY: fetch only copies the id out.
unsafe impl QueryData for Entity {
    type Item<'w> = Entity;
    type State = ();

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_component_access(_state: &Self::State, _access: &mut FilteredAccess) {}

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        _state: &Self::State,
        _world: &'w World,
        entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        entity
    }
}

// SAFETY: no writes.
unsafe impl ReadOnlyQueryData for Entity {}

// SAFETY: the inner data declares its own access; absence performs no
// access at all.
unsafe impl<T: Component> QueryData for Option<&T> {
    type Item<'w> = Option<&'w T>;
    type State = ComponentState<T>;

    fn init_state(world: &mut World) -> Self::State {
        ComponentState::new(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_write(state.id),
            "Option<&{0}> conflicts with a previous `&mut {0}` in the same query",
            std::any::type_name::<T>()
        );
        // Reads T where present, but must not add a `With` constraint.
        access.access_mut().add_component_read(state.id);
    }

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        world
            .component_ptr(entity, location, state.id, T::STORAGE_TYPE)
            .map(|ptr| &*ptr.cast::<T>())
    }
}

// SAFETY: reads only.
unsafe impl<T: Component> ReadOnlyQueryData for Option<&T> {}

// SAFETY: as for `&mut T`, nullable.
unsafe impl<T: Component> QueryData for Option<&mut T> {
    type Item<'w> = Option<Mut<'w, T>>;
    type State = ComponentState<T>;

    fn init_state(world: &mut World) -> Self::State {
        ComponentState::new(world)
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        assert!(
            !access.access().has_component_read(state.id),
            "Option<&mut {0}> conflicts with a previous access of {0} in the same query",
            std::any::type_name::<T>()
        );
        access.access_mut().add_component_write(state.id);
    }

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        world.get_mut_by_id::<T>(entity, location, state.id, T::STORAGE_TYPE, last_run, this_run)
    }
}

/// Yields whether the entity has component `T`, without accessing the value.
pub struct Has<T>(PhantomData<T>);

// SAFETY: purely archetypal; touches no component data.
unsafe impl<T: Component> QueryData for Has<T> {
    type Item<'w> = bool;
    type State = ComponentState<T>;

    fn init_state(world: &mut World) -> Self::State {
        ComponentState::new(world)
    }

    fn update_component_access(_state: &Self::State, _access: &mut FilteredAccess) {}

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: &'w World,
        _entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        world
            .archetypes()
            .get(location.archetype_id)
            .is_some_and(|archetype| archetype.contains(state.id))
    }
}

// SAFETY: no data access.
unsafe impl<T: Component> ReadOnlyQueryData for Has<T> {}

macro_rules! impl_query_data_for_tuple {
    ($($name:ident),*) => {
        // SAFETY: each member declares its own access into the shared
        // FilteredAccess, which detects intra-tuple conflicts.
        unsafe impl<$($name: QueryData),*> QueryData for ($($name,)*) {
            type Item<'w> = ($($name::Item<'w>,)*);
            type State = ($($name::State,)*);

            #[allow(unused_variables, clippy::unused_unit)]
            fn init_state(world: &mut World) -> Self::State {
                ($($name::init_state(world),)*)
            }

            #[allow(unused_variables, non_snake_case)]
            fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
                let ($($name,)*) = state;
                $($name::update_component_access($name, access);)*
            }

            #[allow(unused_variables, non_snake_case)]
            fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
                let ($($name,)*) = state;
                true $(&& $name::matches_archetype($name, archetype))*
            }

            #[allow(unused_variables, non_snake_case, clippy::unused_unit)]
            unsafe fn fetch<'w>(
                state: &Self::State,
                world: &'w World,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> Self::Item<'w> {
                let ($($name,)*) = state;
                ($($name::fetch($name, world, entity, location, last_run, this_run),)*)
            }
        }

        // SAFETY: a tuple of read-only members is read-only.
        unsafe impl<$($name: ReadOnlyQueryData),*> ReadOnlyQueryData for ($($name,)*) {}
    };
}

impl_query_data_for_tuple!();
impl_query_data_for_tuple!(D0);
impl_query_data_for_tuple!(D0, D1);
impl_query_data_for_tuple!(D0, D1, D2);
impl_query_data_for_tuple!(D0, D1, D2, D3);
impl_query_data_for_tuple!(D0, D1, D2, D3, D4);
impl_query_data_for_tuple!(D0, D1, D2, D3, D4, D5);
impl_query_data_for_tuple!(D0, D1, D2, D3, D4, D5, D6);
impl_query_data_for_tuple!(D0, D1, D2, D3, D4, D5, D6, D7);
