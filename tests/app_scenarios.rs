//! End-to-end scenarios across the world, scheduler and app layers.

use ember::prelude::*;

#[derive(Debug, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}
impl Component for Position {}

#[derive(Debug, PartialEq)]
struct Health(i64);
impl Component for Health {}

#[derive(Default)]
struct Checks(u32);
impl Resource for Checks {}

#[test]
fn spawn_then_insert_through_commands() {
    #[derive(Default)]
    struct Spawned(Option<Entity>);
    impl Resource for Spawned {}

    fn spawn(mut commands: Commands, mut spawned: ResMut<Spawned>) {
        let entity = commands.spawn_empty().id();
        commands.entity(entity).insert(Position { x: 1, y: 2 });
        spawned.0 = Some(entity);
    }

    fn verify(
        mut query: Query<(Entity, &Position)>,
        spawned: Res<Spawned>,
        mut checks: ResMut<Checks>,
    ) {
        if let Some((entity, position)) = query.single() {
            if Some(entity) == spawned.0 && position == &(Position { x: 1, y: 2 }) {
                checks.0 += 1;
            }
        }
    }

    let mut app = App::new();
    app.init_resource::<Spawned>();
    app.init_resource::<Checks>();
    app.add_systems(Startup, spawn);
    app.add_systems(Update, verify);
    app.update();
    app.update();
    assert_eq!(
        app.world().resource::<Checks>().0,
        2,
        "the spawned entity with its inserted component must be visible every frame"
    );
}

#[test]
fn conflicting_queries_never_tear() {
    // One system writes every Health, one reads every Health. Over many
    // frames, the reader must always observe a consistent (fully written)
    // state: all values equal.
    fn write(mut query: Query<&mut Health>) {
        let mut values = query.iter().collect::<Vec<_>>();
        let next = values.first().map(|h| h.0 + 1).unwrap_or(0);
        for health in &mut values {
            health.0 = next;
        }
    }

    #[derive(Default)]
    struct TornReads(u32);
    impl Resource for TornReads {}

    fn read(mut query: Query<&Health>, mut checks: ResMut<Checks>, mut torn: ResMut<TornReads>) {
        let values: Vec<i64> = query.iter().map(|h| h.0).collect();
        if !values.windows(2).all(|pair| pair[0] == pair[1]) {
            torn.0 += 1;
        }
        checks.0 += 1;
    }

    let mut app = App::new();
    app.init_resource::<Checks>();
    app.init_resource::<TornReads>();
    for _ in 0..64 {
        app.world_mut().spawn(Health(0));
    }
    app.add_systems(Update, write);
    app.add_systems(Update, read);
    for _ in 0..100 {
        app.update();
    }
    assert_eq!(app.world().resource::<Checks>().0, 100);
    assert_eq!(app.world().resource::<TornReads>().0, 0, "no torn reads");
}

#[test]
fn events_cross_frames_in_writer_order() {
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Ping(u32);

    #[derive(Default)]
    struct Seen(Vec<u32>);
    impl Resource for Seen {}

    fn write(mut frames: Local<u32>, mut events: EventWriter<Ping>) {
        *frames += 1;
        events.write(Ping(*frames * 10));
        events.write(Ping(*frames * 10 + 1));
    }

    fn read(mut events: EventReader<Ping>, mut seen: ResMut<Seen>) {
        for ping in events.read() {
            seen.0.push(ping.0);
        }
    }

    let mut app = App::new();
    app.add_event::<Ping>();
    app.init_resource::<Seen>();
    app.add_systems(Update, (write, read).chain());
    app.update();
    app.update();
    app.update();
    assert_eq!(
        app.world().resource::<Seen>().0,
        vec![10, 11, 20, 21, 30, 31]
    );
}

#[test]
fn resource_scope_is_usable_from_exclusive_systems() {
    #[derive(Default)]
    struct Tally(u32);
    impl Resource for Tally {}

    fn exclusive(world: &mut World) {
        world
            .resource_scope::<Tally, _>(|world, tally| {
                // Full world access with the resource temporarily out.
                world.spawn(Health(1));
                tally.0 += 1;
            })
            .expect("resource present");
    }

    let mut app = App::new();
    app.init_resource::<Tally>();
    app.add_systems(Update, exclusive);
    app.update();
    app.update();
    assert_eq!(app.world().resource::<Tally>().0, 2);
    let mut query = app.world_mut().query::<&Health>();
    assert_eq!(query.iter_mut(app.world_mut()).count(), 2);
}

#[test]
fn despawn_through_commands_is_deferred_and_applied() {
    fn cull(mut commands: Commands, mut query: Query<(Entity, &Health)>) {
        for (entity, health) in query.iter() {
            if health.0 <= 0 {
                commands.entity(entity).despawn();
            }
        }
    }

    let mut app = App::new();
    let dead = app.world_mut().spawn(Health(0)).id();
    let alive = app.world_mut().spawn(Health(5)).id();
    app.add_systems(Update, cull);
    app.update();
    assert!(!app.world().contains_entity(dead));
    assert!(app.world().contains_entity(alive));
}
