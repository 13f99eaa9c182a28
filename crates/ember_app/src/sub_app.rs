use std::collections::HashSet;

use ember_ecs::{
    error::EcsError,
    prelude::*,
    schedule::{BoxedScheduleLabel, IntoSetConfigs, IntoSystemConfigs, SystemDispatcher, SystemPool},
};

use crate::{
    main_schedule::{First, ScheduleOrder},
    plugin::{Plugin, PluginsState},
};

pub(crate) type ExtractFn = Box<dyn FnMut(&mut World, &mut World) + Send + Sync>;

/// A secondary application with its own [`World`] and schedules.
///
/// While a sub-app updates, its world is temporarily owned by the system
/// dispatcher; direct world accesses during that window surface
/// [`EcsError::WorldNotOwned`].
pub struct SubApp {
    world: Option<World>,
    pool: SystemPool,
    pub(crate) plugin_registry: Vec<Box<dyn Plugin>>,
    pub(crate) plugin_names: HashSet<String>,
    pub(crate) plugins_state: PluginsState,
    extract: Option<ExtractFn>,
}

impl Default for SubApp {
    fn default() -> Self {
        let mut world = World::new();
        world.init_resource::<Schedules>();
        world.init_resource::<ScheduleOrder>();
        Self {
            world: Some(world),
            pool: SystemDispatcher::default_pool(),
            plugin_registry: Vec::new(),
            plugin_names: HashSet::new(),
            plugins_state: PluginsState::Adding,
            extract: None,
        }
    }
}

impl SubApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_world(&self) -> Result<&World, EcsError> {
        self.world.as_ref().ok_or(EcsError::WorldNotOwned)
    }

    pub fn get_world_mut(&mut self) -> Result<&mut World, EcsError> {
        self.world.as_mut().ok_or(EcsError::WorldNotOwned)
    }

    #[track_caller]
    pub fn world(&self) -> &World {
        self.get_world()
            .expect("the sub-app's world is currently taken out (extract or update in progress)")
    }

    #[track_caller]
    pub fn world_mut(&mut self) -> &mut World {
        self.get_world_mut()
            .expect("the sub-app's world is currently taken out (extract or update in progress)")
    }

    pub(crate) fn take_world(&mut self) -> Result<World, EcsError> {
        self.world.take().ok_or(EcsError::WorldNotOwned)
    }

    pub(crate) fn restore_world(&mut self, world: World) {
        debug_assert!(self.world.is_none());
        self.world = Some(world);
    }

    // ---- registration ------------------------------------------------------

    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> &mut Self {
        self.world_mut().insert_resource(resource);
        self
    }

    pub fn init_resource<R: Resource + Default>(&mut self) -> &mut Self {
        self.world_mut().init_resource::<R>();
        self
    }

    pub fn add_schedule(&mut self, schedule: Schedule) -> &mut Self {
        self.world_mut()
            .resource_mut::<Schedules>()
            .insert(schedule);
        self
    }

    pub fn init_schedule(&mut self, label: impl ScheduleLabel + Clone) -> &mut Self {
        let mut schedules = self.world_mut().resource_mut::<Schedules>();
        schedules.entry(label);
        drop(schedules);
        self
    }

    pub fn add_systems<M>(
        &mut self,
        label: impl ScheduleLabel + Clone,
        systems: impl IntoSystemConfigs<M>,
    ) -> &mut Self {
        let mut schedules = self.world_mut().resource_mut::<Schedules>();
        schedules.entry(label).add_systems(systems);
        drop(schedules);
        self
    }

    pub fn configure_sets<M>(
        &mut self,
        label: impl ScheduleLabel + Clone,
        sets: impl IntoSetConfigs<M>,
    ) -> &mut Self {
        let mut schedules = self.world_mut().resource_mut::<Schedules>();
        schedules.entry(label).configure_sets(sets);
        drop(schedules);
        self
    }

    /// Registers event type `T`: its channel resource plus the buffer
    /// rotation system in [`First`].
    pub fn add_event<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        if !self.world().contains_resource::<Events<T>>() {
            self.world_mut().init_resource::<Events<T>>();
            self.add_systems(First, Events::<T>::update_system);
        }
        self
    }

    // ---- extract -----------------------------------------------------------

    /// Sets the function that copies data from a parent world into this
    /// sub-app's world at the synchronization point before this sub-app
    /// updates.
    pub fn set_extract(
        &mut self,
        extract: impl FnMut(&mut World, &mut World) + Send + Sync + 'static,
    ) -> &mut Self {
        self.extract = Some(Box::new(extract));
        self
    }

    /// Runs the registered extract function against the parent world.
    pub fn extract(&mut self, parent_world: &mut World) {
        if let Some(extract) = self.extract.as_mut() {
            let world = self
                .world
                .as_mut()
                .expect("sub-app world present during extract");
            extract(parent_world, world);
        }
    }

    // ---- execution ---------------------------------------------------------

    /// Runs every schedule in this sub-app's [`ScheduleOrder`], then clears
    /// change trackers.
    pub fn update(&mut self) {
        let mut world = match self.take_world() {
            Ok(world) => world,
            Err(_) => {
                log::error!("cannot update sub-app: world is not owned");
                return;
            }
        };
        if let Some(tick) = world.check_change_ticks() {
            let _ = world.resource_scope::<Schedules, _>(|_, schedules| {
                schedules.check_change_tick(tick);
            });
        }
        let order: Vec<BoxedScheduleLabel> = world.resource::<ScheduleOrder>().labels.clone();
        let dispatcher = SystemDispatcher::new(world, self.pool.clone());
        for label in &order {
            run_schedule_on(&dispatcher, label.as_ref());
        }
        let mut world = dispatcher.into_world();
        world.clear_trackers();
        self.restore_world(world);
    }

    /// Runs a single schedule (outside the normal order), e.g. the exit
    /// triple.
    pub fn run_schedule(&mut self, label: impl ScheduleLabel) {
        let world = match self.take_world() {
            Ok(world) => world,
            Err(_) => {
                log::error!("cannot run schedule: world is not owned");
                return;
            }
        };
        let dispatcher = SystemDispatcher::new(world, self.pool.clone());
        run_schedule_on(&dispatcher, &label);
        self.restore_world(dispatcher.into_world());
    }
}

/// Takes the schedule out of the world, executes it on the dispatcher, and
/// reinserts it. Re-insertion over a schedule added mid-execution warns and
/// overwrites.
fn run_schedule_on(dispatcher: &SystemDispatcher, label: &dyn ScheduleLabel) {
    let schedule = dispatcher.world_scope(|world| {
        world
            .get_resource_mut::<Schedules>()
            .and_then(|mut schedules| schedules.remove(label))
    });
    let Some(mut schedule) = schedule else {
        log::error!("failed to run schedule {label:?}: schedule not found");
        return;
    };
    schedule.execute(dispatcher);
    dispatcher.world_scope(|world| {
        world.resource_mut::<Schedules>().insert(schedule);
    });
}
