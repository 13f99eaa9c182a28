use std::marker::PhantomData;

use crate::{
    archetype::Archetype,
    component::{Component, ComponentId},
    query::access::FilteredAccess,
    world::World,
};

/// An archetype-level constraint on which entities a query yields. Filters
/// access no component data.
pub trait QueryFilter {
    type State: Send + Sync + Clone + 'static;

    fn init_state(world: &mut World) -> Self::State;
    fn update_component_access(state: &Self::State, access: &mut FilteredAccess);
    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool;
}

/// Matches only entities that have component `T`.
pub struct With<T>(PhantomData<T>);

/// Matches only entities that do not have component `T`.
pub struct Without<T>(PhantomData<T>);

pub struct FilterState<T> {
    id: ComponentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FilterState<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Component> QueryFilter for With<T> {
    type State = FilterState<T>;

    fn init_state(world: &mut World) -> Self::State {
        FilterState {
            id: world.register_component::<T>(),
            _marker: PhantomData,
        }
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        access.and_with(state.id);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(state.id)
    }
}

impl<T: Component> QueryFilter for Without<T> {
    type State = FilterState<T>;

    fn init_state(world: &mut World) -> Self::State {
        FilterState {
            id: world.register_component::<T>(),
            _marker: PhantomData,
        }
    }

    fn update_component_access(state: &Self::State, access: &mut FilteredAccess) {
        access.and_without(state.id);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        !archetype.contains(state.id)
    }
}

macro_rules! impl_query_filter_for_tuple {
    ($($name:ident),*) => {
        impl<$($name: QueryFilter),*> QueryFilter for ($($name,)*) {
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
        }
    };
}

impl_query_filter_for_tuple!();
impl_query_filter_for_tuple!(F0);
impl_query_filter_for_tuple!(F0, F1);
impl_query_filter_for_tuple!(F0, F1, F2);
impl_query_filter_for_tuple!(F0, F1, F2, F3);
