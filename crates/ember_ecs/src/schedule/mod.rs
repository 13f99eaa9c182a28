//! Schedules: labeled system graphs, their build step, and the parallel
//! dispatcher that executes them.

mod config;
mod dispatcher;
pub mod label;
#[allow(clippy::module_inception)]
mod schedule;

pub use config::{
    IntoSetConfigs, IntoSystemConfigs, SetConfig, SetConfigs, SystemConfig, SystemConfigs,
};
pub use dispatcher::{SystemDispatcher, SystemPool};
pub use label::{
    BoxedScheduleLabel, BoxedSystemSet, IntoSystemSet, ScheduleLabel, SystemSet, SystemTypeSet,
};
pub use schedule::{ExecuteConfig, Schedule, Schedules};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detection::ResMut;
    use crate::component::Resource;
    use crate::world::World;
    use std::sync::Arc;

    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct TestSchedule;

    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    enum Phase {
        Collect,
        Resolve,
    }

    #[derive(Default)]
    struct Trace(Vec<&'static str>);
    impl Resource for Trace {}

    fn dispatcher_with(world: World) -> SystemDispatcher {
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(4)
                .build()
                .unwrap(),
        );
        SystemDispatcher::new(world, pool)
    }

    #[test]
    fn chain_imposes_total_order() {
        fn one(mut trace: ResMut<Trace>) {
            trace.0.push("1");
        }
        fn two(mut trace: ResMut<Trace>) {
            trace.0.push("2");
        }
        fn three(mut trace: ResMut<Trace>) {
            trace.0.push("3");
        }

        let mut world = World::new();
        world.insert_resource(Trace::default());
        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems((one, two, three).chain());

        let dispatcher = dispatcher_with(world);
        for _ in 0..10 {
            schedule.execute(&dispatcher);
        }
        let world = dispatcher.into_world();
        let trace = &world.resource::<Trace>().0;
        assert_eq!(trace.len(), 30);
        for frame in trace.chunks(3) {
            assert_eq!(frame, ["1", "2", "3"]);
        }
    }

    #[test]
    fn before_after_edges_are_respected() {
        fn produce(mut trace: ResMut<Trace>) {
            trace.0.push("produce");
        }
        fn consume(mut trace: ResMut<Trace>) {
            trace.0.push("consume");
        }

        let mut world = World::new();
        world.insert_resource(Trace::default());
        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(consume.after(produce));
        schedule.add_systems(produce);

        let dispatcher = dispatcher_with(world);
        schedule.execute(&dispatcher);
        let world = dispatcher.into_world();
        assert_eq!(world.resource::<Trace>().0, vec!["produce", "consume"]);
    }

    #[test]
    fn set_ordering_lowers_to_system_edges() {
        fn gather(mut trace: ResMut<Trace>) {
            trace.0.push("gather");
        }
        fn apply(mut trace: ResMut<Trace>) {
            trace.0.push("apply");
        }

        let mut world = World::new();
        world.insert_resource(Trace::default());
        let mut schedule = Schedule::new(TestSchedule);
        schedule.configure_sets(Phase::Resolve.after(Phase::Collect));
        schedule.add_systems(apply.in_set(Phase::Resolve));
        schedule.add_systems(gather.in_set(Phase::Collect));

        let dispatcher = dispatcher_with(world);
        schedule.execute(&dispatcher);
        let world = dispatcher.into_world();
        assert_eq!(world.resource::<Trace>().0, vec!["gather", "apply"]);
    }

    #[test]
    fn cycles_are_rejected_with_a_path() {
        fn a() {}
        fn b() {}

        let mut world = World::new();
        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(a.before(b));
        schedule.add_systems(b.before(a));
        let error = schedule.initialize(&mut world).unwrap_err();
        let crate::error::ScheduleBuildError::Cycle { path } = error;
        assert!(path.len() >= 3);
    }

    #[test]
    fn run_once_schedules_skip_after_first_run() {
        fn bump(mut trace: ResMut<Trace>) {
            trace.0.push("ran");
        }

        let mut world = World::new();
        world.insert_resource(Trace::default());
        let mut schedule = Schedule::new(TestSchedule).with_execute_config(ExecuteConfig {
            apply_direct: true,
            run_once: true,
        });
        schedule.add_systems(bump);

        let dispatcher = dispatcher_with(world);
        schedule.execute(&dispatcher);
        schedule.execute(&dispatcher);
        let world = dispatcher.into_world();
        assert_eq!(world.resource::<Trace>().0, vec!["ran"]);
    }

    #[test]
    fn exclusive_systems_interleave_with_parallel_ones() {
        fn normal(mut trace: ResMut<Trace>) {
            trace.0.push("normal");
        }

        let mut world = World::new();
        world.insert_resource(Trace::default());
        let mut schedule = Schedule::new(TestSchedule);
        schedule.add_systems(normal);
        schedule.add_systems(|world: &mut World| {
            world.resource_mut::<Trace>().0.push("exclusive");
        });

        let dispatcher = dispatcher_with(world);
        schedule.execute(&dispatcher);
        let world = dispatcher.into_world();
        let mut trace = world.resource::<Trace>().0.clone();
        trace.sort_unstable();
        assert_eq!(trace, vec!["exclusive", "normal"]);
    }

    #[test]
    fn duplicate_schedule_labels_overwrite() {
        let mut schedules = Schedules::default();
        schedules.insert(Schedule::new(TestSchedule));
        let mut replacement = Schedule::new(TestSchedule);
        replacement.add_systems(|| {});
        schedules.insert(replacement);
        assert_eq!(
            schedules.get(&TestSchedule).unwrap().system_count(),
            1,
            "second insert must overwrite the first"
        );
    }
}
