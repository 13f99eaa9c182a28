use std::collections::HashMap;
use std::num::NonZeroU8;

use ember_ecs::{
    define_label,
    prelude::*,
    schedule::{IntoSetConfigs, IntoSystemConfigs},
};

use crate::{
    main_schedule::MainSchedulePlugin,
    plugin::{Plugin, Plugins, PluginsState},
    sub_app::SubApp,
};

define_label!(
    /// Names a [`SubApp`] within an [`App`].
    AppLabel,
    BoxedAppLabel
);

/// An event whose presence asks the runner to terminate after the current
/// update completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppExit {
    Success,
    /// Failure, with a non-zero exit code.
    Error(NonZeroU8),
}

impl AppExit {
    /// `Success` for 0, `Error` otherwise.
    pub fn from_code(code: u8) -> Self {
        match NonZeroU8::new(code) {
            Some(code) => Self::Error(code),
            None => Self::Success,
        }
    }

    pub fn error() -> Self {
        Self::Error(NonZeroU8::MIN)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error(code) => code.get(),
        }
    }
}

/// Drives an [`App`]: [`step`](Runner::step) is called repeatedly until it
/// returns `false`, then [`exit`](Runner::exit) runs the shutdown
/// schedules.
pub trait Runner: Send + Sync {
    fn step(&mut self, app: &mut App) -> bool;

    fn exit(&mut self, app: &mut App) {
        app.run_exit_schedules();
    }
}

/// A runner that performs exactly one update.
struct RunOnce;

impl Runner for RunOnce {
    fn step(&mut self, app: &mut App) -> bool {
        app.update();
        app.record_exit();
        false
    }
}

/// The application: a main [`SubApp`], labeled secondary sub-apps updated
/// after an extract step, and a runner.
pub struct App {
    main: SubApp,
    sub_apps: HashMap<BoxedAppLabel, SubApp>,
    runner: Option<Box<dyn Runner>>,
    exit_state: Option<AppExit>,
}

impl Default for App {
    fn default() -> Self {
        let mut app = App::empty();
        app.add_plugins(MainSchedulePlugin);
        app.add_event::<AppExit>();
        app
    }
}

impl App {
    /// An app with the canonical schedules, the `AppExit` event, and the
    /// run-once runner installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// An app with no schedules, events or runner besides the bare world.
    pub fn empty() -> Self {
        Self {
            main: SubApp::new(),
            sub_apps: HashMap::new(),
            runner: Some(Box::new(RunOnce)),
            exit_state: None,
        }
    }

    #[inline]
    pub fn main(&self) -> &SubApp {
        &self.main
    }

    #[inline]
    pub fn main_mut(&mut self) -> &mut SubApp {
        &mut self.main
    }

    #[track_caller]
    pub fn world(&self) -> &World {
        self.main.world()
    }

    #[track_caller]
    pub fn world_mut(&mut self) -> &mut World {
        self.main.world_mut()
    }

    // ---- registration ------------------------------------------------------

    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> &mut Self {
        self.main.insert_resource(resource);
        self
    }

    pub fn init_resource<R: Resource + Default>(&mut self) -> &mut Self {
        self.main.init_resource::<R>();
        self
    }

    pub fn add_schedule(&mut self, schedule: Schedule) -> &mut Self {
        self.main.add_schedule(schedule);
        self
    }

    pub fn init_schedule(&mut self, label: impl ScheduleLabel + Clone) -> &mut Self {
        self.main.init_schedule(label);
        self
    }

    pub fn add_systems<M>(
        &mut self,
        label: impl ScheduleLabel + Clone,
        systems: impl IntoSystemConfigs<M>,
    ) -> &mut Self {
        self.main.add_systems(label, systems);
        self
    }

    pub fn configure_sets<M>(
        &mut self,
        label: impl ScheduleLabel + Clone,
        sets: impl IntoSetConfigs<M>,
    ) -> &mut Self {
        self.main.configure_sets(label, sets);
        self
    }

    pub fn add_event<T: Send + Sync + 'static>(&mut self) -> &mut Self {
        self.main.add_event::<T>();
        self
    }

    // ---- plugins -----------------------------------------------------------

    pub fn add_plugins<M>(&mut self, plugins: impl Plugins<M>) -> &mut Self {
        if self.main.plugins_state != PluginsState::Adding {
            panic!("plugins cannot be added after App::run() started");
        }
        plugins.add_to_app(self);
        self
    }

    pub(crate) fn add_boxed_plugin(&mut self, plugin: Box<dyn Plugin>) {
        if self.main.plugin_names.contains(plugin.name()) {
            log::warn!("plugin `{}` was already added; skipping", plugin.name());
            return;
        }
        log::debug!("added plugin: {}", plugin.name());
        self.main.plugin_names.insert(plugin.name().to_string());
        plugin.build(self);
        self.main.plugin_registry.push(plugin);
    }

    pub fn is_plugin_added<T: Plugin>(&self) -> bool {
        self.main
            .plugin_names
            .contains(std::any::type_name::<T>())
    }

    /// Runs every plugin's `finish` once all builds are done.
    pub fn finish(&mut self) {
        if self.main.plugins_state != PluginsState::Adding {
            return;
        }
        let plugins = std::mem::take(&mut self.main.plugin_registry);
        for plugin in &plugins {
            plugin.finish(self);
        }
        self.main.plugin_registry = plugins;
        self.main.plugins_state = PluginsState::Finished;
    }

    // ---- sub-apps ----------------------------------------------------------

    pub fn insert_sub_app(&mut self, label: impl AppLabel, sub_app: SubApp) -> &mut Self {
        self.sub_apps.insert(Box::new(label), sub_app);
        self
    }

    pub fn get_sub_app(&self, label: &dyn AppLabel) -> Option<&SubApp> {
        self.sub_apps.get(label)
    }

    pub fn get_sub_app_mut(&mut self, label: &dyn AppLabel) -> Option<&mut SubApp> {
        self.sub_apps.get_mut(label)
    }

    #[track_caller]
    pub fn sub_app_mut(&mut self, label: impl AppLabel) -> &mut SubApp {
        self.sub_apps
            .get_mut(&label as &dyn AppLabel)
            .unwrap_or_else(|| panic!("sub-app {label:?} does not exist"))
    }

    // ---- execution ---------------------------------------------------------

    /// Runs one frame: the main sub-app's schedule order, then each
    /// secondary sub-app's extract and update.
    pub fn update(&mut self) {
        self.main.update();
        for sub_app in self.sub_apps.values_mut() {
            match self.main.get_world_mut() {
                Ok(main_world) => sub_app.extract(main_world),
                Err(error) => {
                    log::error!("skipping sub-app extract: {error}");
                    continue;
                }
            }
            sub_app.update();
        }
    }

    /// Latches the latest `AppExit` event, if any was written this frame.
    pub fn record_exit(&mut self) -> Option<AppExit> {
        let exit = {
            let world = self.main.get_world().ok()?;
            let events = world.get_resource::<Events<AppExit>>()?;
            let mut reader = events.get_reader();
            reader.read(&events).last().copied()
        };
        if let Some(exit) = exit {
            self.exit_state = Some(exit);
        }
        exit
    }

    pub fn should_exit(&mut self) -> bool {
        self.record_exit().is_some() || self.exit_state.is_some()
    }

    /// Runs the `PreExit`, `Exit` and `PostExit` schedules.
    pub fn run_exit_schedules(&mut self) {
        use crate::main_schedule::{Exit, PostExit, PreExit};
        self.main.run_schedule(PreExit);
        self.main.run_schedule(Exit);
        self.main.run_schedule(PostExit);
    }

    pub fn set_runner(&mut self, runner: impl Runner + 'static) -> &mut Self {
        self.runner = Some(Box::new(runner));
        self
    }

    /// Finishes plugins, then drives the app through the runner until it
    /// stops. Returns the recorded exit state.
    pub fn run(&mut self) -> AppExit {
        log::info!("app building finished; running");
        self.finish();
        let mut runner = self.runner.take().expect("no runner set for App");
        while runner.step(self) {}
        runner.exit(self);
        self.runner = Some(runner);
        log::info!("app terminated");
        self.exit_state.take().unwrap_or(AppExit::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::main_schedule::{Startup, Update};

    #[derive(Default)]
    struct Counter(u32);
    impl Resource for Counter {}

    #[test]
    fn startup_runs_once_update_runs_every_frame() {
        fn startup(mut counter: ResMut<Counter>) {
            counter.0 += 100;
        }
        fn update(mut counter: ResMut<Counter>) {
            counter.0 += 1;
        }

        let mut app = App::new();
        app.init_resource::<Counter>();
        app.add_systems(Startup, startup);
        app.add_systems(Update, update);
        app.update();
        app.update();
        app.update();
        assert_eq!(app.world().resource::<Counter>().0, 103);
    }

    #[test]
    fn spawn_in_startup_visible_in_update() {
        #[derive(Debug, PartialEq)]
        struct Tag(u32);
        impl Component for Tag {}

        fn spawn(mut commands: Commands) {
            commands.spawn(Tag(9));
        }
        fn check(mut counter: ResMut<Counter>, mut query: Query<&Tag>) {
            counter.0 += query.iter().map(|tag| tag.0).sum::<u32>();
        }

        let mut app = App::new();
        app.init_resource::<Counter>();
        app.add_systems(Startup, spawn);
        app.add_systems(Update, check);
        app.update();
        assert_eq!(app.world().resource::<Counter>().0, 9);
    }

    #[test]
    fn duplicate_plugins_are_skipped() {
        struct CountingPlugin;
        impl Plugin for CountingPlugin {
            fn build(&self, app: &mut App) {
                let count = app
                    .world()
                    .get_resource::<Counter>()
                    .map(|c| c.0)
                    .unwrap_or(0);
                app.insert_resource(Counter(count + 1));
            }
        }

        let mut app = App::new();
        app.add_plugins(CountingPlugin);
        app.add_plugins(CountingPlugin);
        assert_eq!(app.world().resource::<Counter>().0, 1);
    }

    #[test]
    fn sub_app_extract_and_update() {
        #[derive(Clone, Eq, PartialEq, Hash, Debug)]
        struct Mirror;

        #[derive(Clone, Eq, PartialEq, Hash, Debug)]
        struct MirrorSchedule;

        #[derive(Default)]
        struct Copied(u32);
        impl Resource for Copied {}

        let mut app = App::new();
        app.insert_resource(Counter(41));

        let mut mirror = SubApp::new();
        mirror.init_resource::<Copied>();
        mirror
            .world_mut()
            .resource_mut::<crate::main_schedule::ScheduleOrder>()
            .push(MirrorSchedule);
        mirror.init_schedule(MirrorSchedule);
        mirror.add_systems(MirrorSchedule, |mut copied: ResMut<Copied>| {
            copied.0 += 1;
        });
        mirror.set_extract(|main_world, sub_world| {
            sub_world.resource_mut::<Copied>().0 = main_world.resource::<Counter>().0;
        });
        app.insert_sub_app(Mirror, mirror);

        app.update();
        let sub_app = app.get_sub_app(&Mirror).unwrap();
        assert_eq!(sub_app.world().resource::<Copied>().0, 42);
    }

    #[test]
    fn exit_code_propagates_through_run() {
        fn request_exit(mut exit: EventWriter<AppExit>) {
            exit.write(AppExit::from_code(7));
        }

        let mut app = App::new();
        app.add_systems(Update, request_exit);
        let exit = app.run();
        assert_eq!(exit.code(), 7);
    }
}
