use std::ops::{Deref, DerefMut};

use crate::{
    change_detection::{Res, ResMut},
    command::{CommandQueue, Commands},
    component::{ComponentId, Resource},
    event::{Events, ManualEventReader},
    query::{Query, QueryData, QueryFilter, QueryState},
    system::SystemMeta,
    tick::Tick,
    world::World,
};

/// A value a system function can take as a parameter.
///
/// At schedule-build time [`init_state`](SystemParam::init_state) resolves
/// the parameter against the world, producing persistent state and folding
/// the parameter's access declaration into the system's access set. At run
/// time [`get_param`](SystemParam::get_param) extracts the value.
///
/// # Safety
/// `init_state` must declare every access `get_param` performs.
pub unsafe trait SystemParam: Sized {
    type State: Send + Sync + 'static;
    type Item<'w, 's>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State;

    /// # Safety
    /// The declared access must have been validated against every
    /// concurrently running system.
    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        change_tick: Tick,
    ) -> Self::Item<'w, 's>;

    /// Applies any deferred work (e.g. command queues) to the world.
    fn apply(_state: &mut Self::State, _world: &mut World) {}
}

/// Shorthand for the runtime item of a parameter.
pub type SystemParamItem<'w, 's, P> = <P as SystemParam>::Item<'w, 's>;

// SAFETY: the query state's access is folded into the system's set, with a
// conflict check against previously declared parameters.
unsafe impl<D: QueryData + 'static, F: QueryFilter + 'static> SystemParam for Query<'_, '_, D, F> {
    type State = QueryState<D, F>;
    type Item<'w, 's> = Query<'w, 's, D, F>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        let state = QueryState::<D, F>::new(world);
        let conflicts = meta
            .access
            .get_conflicts_single(state.component_access());
        assert!(
            conflicts.is_empty(),
            "query in system `{}` conflicts with a previous parameter on {:?}; \
             disjoint With/Without filters can disambiguate overlapping access",
            meta.name,
            conflicts.ids(),
        );
        meta.access.add(state.component_access().clone());
        state
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        Query::new(world, state, meta.last_run, change_tick)
    }
}

fn register_resource_read<T: Resource>(world: &mut World, meta: &mut SystemMeta) -> ComponentId {
    let id = world.registry().register_resource::<T>();
    assert!(
        !meta.access.combined_access().has_resource_write(id),
        "Res<{0}> in system `{1}` conflicts with a previous ResMut<{0}>",
        std::any::type_name::<T>(),
        meta.name,
    );
    meta.access.add_unfiltered_resource_read(id);
    id
}

fn register_resource_write<T: Resource>(world: &mut World, meta: &mut SystemMeta) -> ComponentId {
    let id = world.registry().register_resource::<T>();
    assert!(
        !meta.access.combined_access().has_resource_read(id),
        "ResMut<{0}> in system `{1}` conflicts with a previous access of {0}",
        std::any::type_name::<T>(),
        meta.name,
    );
    meta.access.add_unfiltered_resource_write(id);
    id
}

// SAFETY: declares a read of the resource id it fetches.
unsafe impl<T: Resource> SystemParam for Res<'_, T> {
    type State = ComponentId;
    type Item<'w, 's> = Res<'w, T>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        register_resource_read::<T>(world, meta)
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        world.resources().get::<T>(*state).unwrap_or_else(|| {
            panic!(
                "resource `{}` requested by system `{}` does not exist",
                std::any::type_name::<T>(),
                meta.name,
            )
        })
    }
}

// SAFETY: as above, absence performs no access.
unsafe impl<T: Resource> SystemParam for Option<Res<'_, T>> {
    type State = ComponentId;
    type Item<'w, 's> = Option<Res<'w, T>>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        register_resource_read::<T>(world, meta)
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        _meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        world.resources().get::<T>(*state)
    }
}

// SAFETY: declares a write of the resource id it fetches.
unsafe impl<T: Resource> SystemParam for ResMut<'_, T> {
    type State = ComponentId;
    type Item<'w, 's> = ResMut<'w, T>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        register_resource_write::<T>(world, meta)
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        world.resources().get_mut::<T>(*state).unwrap_or_else(|| {
            panic!(
                "resource `{}` requested by system `{}` does not exist",
                std::any::type_name::<T>(),
                meta.name,
            )
        })
    }
}

// SAFETY: as above.
unsafe impl<T: Resource> SystemParam for Option<ResMut<'_, T>> {
    type State = ComponentId;
    type Item<'w, 's> = Option<ResMut<'w, T>>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        register_resource_write::<T>(world, meta)
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        _meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        world.resources().get_mut::<T>(*state)
    }
}

// SAFETY: commands only touch the system-owned queue and the lock-free
// entity reservation path; deferred effects apply under `&mut World`.
unsafe impl SystemParam for Commands<'_, '_> {
    type State = CommandQueue;
    type Item<'w, 's> = Commands<'w, 's>;

    fn init_state(_world: &mut World, _meta: &mut SystemMeta) -> Self::State {
        CommandQueue::default()
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        _meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        Commands::new(state, world.entities())
    }

    fn apply(state: &mut Self::State, world: &mut World) {
        state.apply(world);
    }
}

// SAFETY: grants read access to everything, declared as such.
unsafe impl SystemParam for &World {
    type State = ();
    type Item<'w, 's> = &'w World;

    fn init_state(_world: &mut World, meta: &mut SystemMeta) -> Self::State {
        assert!(
            !meta
                .access
                .combined_access()
                .has_any_component_write()
                && !meta.access.combined_access().has_any_resource_write(),
            "&World in system `{}` conflicts with a previous mutable parameter",
            meta.name,
        );
        meta.access.add_unfiltered_read_all();
    }

    unsafe fn get_param<'w, 's>(
        _state: &'s mut Self::State,
        _meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        world
    }
}

/// System-local state, default-initialized on first run and persisted across
/// runs of the same system.
pub struct Local<'s, T: Send + Sync + 'static>(pub(crate) &'s mut T);

impl<T: Send + Sync + 'static> Deref for Local<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

impl<T: Send + Sync + 'static> DerefMut for Local<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

// SAFETY: local state performs no world access.
unsafe impl<T: Default + Send + Sync + 'static> SystemParam for Local<'_, T> {
    type State = T;
    type Item<'w, 's> = Local<'s, T>;

    fn init_state(_world: &mut World, _meta: &mut SystemMeta) -> Self::State {
        T::default()
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        _meta: &SystemMeta,
        _world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        Local(state)
    }
}

/// Reads events of type `T` in writer order, tracking a per-system cursor.
pub struct EventReader<'w, 's, T: Send + Sync + 'static> {
    reader: &'s mut ManualEventReader<T>,
    events: Res<'w, Events<T>>,
}

impl<'w, T: Send + Sync + 'static> EventReader<'w, '_, T> {
    /// Yields all unread events, advancing the cursor.
    pub fn read(&mut self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.reader.read(&self.events)
    }

    pub fn len(&self) -> usize {
        self.reader.len(&self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.reader.is_empty(&self.events)
    }

    /// Consumes all unread events without yielding them.
    pub fn clear(&mut self) {
        self.reader.read(&self.events).for_each(|_| {});
    }
}

// SAFETY: reads the `Events<T>` resource, declared below.
unsafe impl<T: Send + Sync + 'static> SystemParam for EventReader<'_, '_, T> {
    type State = (ComponentId, ManualEventReader<T>);
    type Item<'w, 's> = EventReader<'w, 's, T>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        world.init_resource::<Events<T>>();
        let id = register_resource_read::<Events<T>>(world, meta);
        (id, ManualEventReader::default())
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        let events = world.resources().get::<Events<T>>(state.0).unwrap_or_else(|| {
            panic!(
                "event channel `{}` requested by system `{}` was removed",
                std::any::type_name::<T>(),
                meta.name,
            )
        });
        EventReader {
            reader: &mut state.1,
            events,
        }
    }
}

/// Appends events of type `T`.
pub struct EventWriter<'w, T: Send + Sync + 'static> {
    events: ResMut<'w, Events<T>>,
}

impl<T: Send + Sync + 'static> EventWriter<'_, T> {
    pub fn write(&mut self, event: T) {
        self.events.send(event);
    }

    /// Alias for [`write`](Self::write), matching the older send-style API.
    pub fn send(&mut self, event: T) {
        self.events.send(event);
    }

    pub fn write_batch(&mut self, events: impl IntoIterator<Item = T>) {
        self.events.extend(events);
    }
}

// SAFETY: writes the `Events<T>` resource, declared below.
unsafe impl<T: Send + Sync + 'static> SystemParam for EventWriter<'_, T> {
    type State = ComponentId;
    type Item<'w, 's> = EventWriter<'w, T>;

    fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
        world.init_resource::<Events<T>>();
        register_resource_write::<Events<T>>(world, meta)
    }

    unsafe fn get_param<'w, 's>(
        state: &'s mut Self::State,
        meta: &SystemMeta,
        world: &'w World,
        _change_tick: Tick,
    ) -> Self::Item<'w, 's> {
        let events = world.resources().get_mut::<Events<T>>(*state).unwrap_or_else(|| {
            panic!(
                "event channel `{}` requested by system `{}` was removed",
                std::any::type_name::<T>(),
                meta.name,
            )
        });
        EventWriter { events }
    }
}

macro_rules! impl_system_param_for_tuple {
    ($($param:ident),*) => {
        // SAFETY: each member declares its own access into the shared meta.
        unsafe impl<$($param: SystemParam),*> SystemParam for ($($param,)*) {
            type State = ($($param::State,)*);
            type Item<'w, 's> = ($($param::Item<'w, 's>,)*);

            #[allow(unused_variables, clippy::unused_unit)]
            fn init_state(world: &mut World, meta: &mut SystemMeta) -> Self::State {
                ($($param::init_state(world, meta),)*)
            }

            #[allow(unused_variables, non_snake_case, clippy::unused_unit)]
            unsafe fn get_param<'w, 's>(
                state: &'s mut Self::State,
                meta: &SystemMeta,
                world: &'w World,
                change_tick: Tick,
            ) -> Self::Item<'w, 's> {
                let ($($param,)*) = state;
                ($($param::get_param($param, meta, world, change_tick),)*)
            }

            #[allow(unused_variables, non_snake_case)]
            fn apply(state: &mut Self::State, world: &mut World) {
                let ($($param,)*) = state;
                $($param::apply($param, world);)*
            }
        }
    };
}

impl_system_param_for_tuple!();
impl_system_param_for_tuple!(P0);
impl_system_param_for_tuple!(P0, P1);
impl_system_param_for_tuple!(P0, P1, P2);
impl_system_param_for_tuple!(P0, P1, P2, P3);
impl_system_param_for_tuple!(P0, P1, P2, P3, P4);
impl_system_param_for_tuple!(P0, P1, P2, P3, P4, P5);
impl_system_param_for_tuple!(P0, P1, P2, P3, P4, P5, P6);
impl_system_param_for_tuple!(P0, P1, P2, P3, P4, P5, P6, P7);
