use std::time::{Duration, Instant};

use crate::{
    app::{App, Runner},
    plugin::Plugin,
};

/// How [`ScheduleRunnerPlugin`] drives the app.
#[derive(Debug, Clone, Copy)]
pub enum RunMode {
    /// Update until an `AppExit` event is observed, optionally sleeping
    /// between frames.
    Loop { wait: Option<Duration> },
    /// Update exactly once.
    Once,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Loop { wait: None }
    }
}

/// The default headless driver: repeatedly updates the app and watches for
/// `AppExit`. Downstream windowing plugins replace this with an event-loop
/// runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleRunnerPlugin {
    pub run_mode: RunMode,
}

impl ScheduleRunnerPlugin {
    pub fn run_once() -> Self {
        Self {
            run_mode: RunMode::Once,
        }
    }

    pub fn run_loop(wait: Duration) -> Self {
        Self {
            run_mode: RunMode::Loop { wait: Some(wait) },
        }
    }
}

struct LoopRunner {
    wait: Option<Duration>,
}

impl Runner for LoopRunner {
    fn step(&mut self, app: &mut App) -> bool {
        let start = Instant::now();
        app.update();
        if app.should_exit() {
            return false;
        }
        if let Some(wait) = self.wait {
            let elapsed = start.elapsed();
            if elapsed < wait {
                std::thread::sleep(wait - elapsed);
            }
        }
        true
    }
}

struct OnceRunner;

impl Runner for OnceRunner {
    fn step(&mut self, app: &mut App) -> bool {
        app.update();
        app.record_exit();
        false
    }
}

impl Plugin for ScheduleRunnerPlugin {
    fn build(&self, app: &mut App) {
        match self.run_mode {
            RunMode::Once => {
                app.set_runner(OnceRunner);
            }
            RunMode::Loop { wait } => {
                app.set_runner(LoopRunner { wait });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppExit;
    use crate::main_schedule::Update;
    use ember_ecs::prelude::*;

    #[derive(Default)]
    struct Frames(u32);
    impl Resource for Frames {}

    #[test]
    fn loop_runner_stops_on_app_exit() {
        fn count_and_exit(mut frames: ResMut<Frames>, mut exit: EventWriter<AppExit>) {
            frames.0 += 1;
            if frames.0 == 3 {
                exit.write(AppExit::Success);
            }
        }

        let mut app = App::new();
        app.init_resource::<Frames>();
        app.add_plugins(ScheduleRunnerPlugin::default());
        app.add_systems(Update, count_and_exit);
        let exit = app.run();
        assert!(exit.is_success());
        assert_eq!(app.world().resource::<Frames>().0, 3);
    }
}
