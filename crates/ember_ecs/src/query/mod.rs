//! Typed views over storage and the access sets they declare.

mod access;
mod fetch;
mod filter;
mod state;

pub use access::{Access, AccessConflicts, AccessFilters, FilteredAccess, FilteredAccessSet};
pub use fetch::{Has, QueryData, ReadOnlyQueryData};
pub use filter::{QueryFilter, With, Without};
pub use state::{Query, QueryIter, QueryState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, StorageType};
    use crate::entity::Entity;
    use crate::world::World;

    #[derive(Debug, PartialEq)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, PartialEq)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[derive(Debug, PartialEq)]
    struct Frozen;
    impl Component for Frozen {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
    }

    #[test]
    fn iter_matches_archetypes() {
        let mut world = World::new();
        world.spawn(Position(1));
        world.spawn((Position(2), Velocity(20)));
        world.spawn(Velocity(30));

        let mut query = world.query::<&Position>();
        let mut values: Vec<i32> = {
            let world_ref = &mut world;
            query.iter_mut(world_ref).map(|p| p.0).collect()
        };
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn mutation_through_query() {
        let mut world = World::new();
        let entity = world.spawn((Position(1), Velocity(5))).id();
        let mut query = world.query::<(&mut Position, &Velocity)>();
        for (mut position, velocity) in query.iter_mut(&mut world) {
            position.0 += velocity.0;
        }
        assert_eq!(world.get::<Position>(entity), Some(&Position(6)));
    }

    #[test]
    fn with_without_filters() {
        let mut world = World::new();
        world.spawn((Position(1), Velocity(0)));
        world.spawn(Position(2));

        let mut with_query = world.query_filtered::<&Position, With<Velocity>>();
        let with_values: Vec<i32> = with_query.iter_mut(&mut world).map(|p| p.0).collect();
        assert_eq!(with_values, vec![1]);

        let mut without_query = world.query_filtered::<&Position, Without<Velocity>>();
        let without_values: Vec<i32> = without_query.iter_mut(&mut world).map(|p| p.0).collect();
        assert_eq!(without_values, vec![2]);
    }

    #[test]
    fn optional_and_has() {
        let mut world = World::new();
        world.spawn(Position(1));
        world.spawn((Position(2), Velocity(9)));

        let mut query = world.query::<(&Position, Option<&Velocity>, Has<Velocity>)>();
        let mut seen: Vec<(i32, Option<i32>, bool)> = query
            .iter_mut(&mut world)
            .map(|(p, v, has)| (p.0, v.map(|v| v.0), has))
            .collect();
        seen.sort_by_key(|(p, _, _)| *p);
        assert_eq!(seen, vec![(1, None, false), (2, Some(9), true)]);
    }

    #[test]
    fn sparse_components_are_queryable() {
        let mut world = World::new();
        let frozen = world.spawn((Position(1), Frozen)).id();
        world.spawn(Position(2));

        let mut query = world.query_filtered::<Entity, With<Frozen>>();
        let matched: Vec<_> = query.iter_mut(&mut world).collect();
        assert_eq!(matched, vec![frozen]);
    }

    #[test]
    fn get_and_single() {
        let mut world = World::new();
        let entity = world.spawn(Position(7)).id();
        let other = world.spawn(Velocity(0)).id();

        let mut query = world.query::<&Position>();
        assert_eq!(query.get_mut(&mut world, entity), Some(&Position(7)));
        assert_eq!(query.get_mut(&mut world, other), None);
    }

    #[test]
    #[should_panic(expected = "conflicts with a previous")]
    fn optional_read_aliasing_a_write_panics() {
        let mut world = World::new();
        world.query::<(&mut Position, Option<&Position>)>();
    }

    #[test]
    #[should_panic(expected = "conflicts with a previous")]
    fn optional_write_aliasing_a_read_panics() {
        let mut world = World::new();
        world.query::<(&Position, Option<&mut Position>)>();
    }

    #[test]
    #[should_panic(expected = "conflicts with a previous")]
    fn duplicate_optional_writes_panic() {
        let mut world = World::new();
        world.query::<(Option<&mut Position>, Option<&mut Position>)>();
    }

    #[test]
    fn state_sees_new_archetypes() {
        let mut world = World::new();
        let mut query = world.query::<&Position>();
        assert!(query.is_empty(&world));
        world.spawn(Position(1));
        // A new archetype appeared after the state was created.
        assert!(!query.is_empty(&world));
        assert_eq!(query.iter_mut(&mut world).count(), 1);
    }
}
