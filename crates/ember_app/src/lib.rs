//! The application layer: [`App`], sub-apps with an extract step, plugins,
//! the canonical main-schedule order, and the default runner.

mod app;
mod main_schedule;
mod plugin;
mod schedule_runner;
mod sub_app;

pub use app::{App, AppExit, AppLabel, BoxedAppLabel, Runner};
pub use main_schedule::{
    Exit, Extract, First, Last, MainSchedulePlugin, PostExit, PostStartup, PostUpdate, PreExit,
    PreStartup, PreUpdate, ScheduleOrder, StateTransition, Startup, Update,
};
pub use plugin::{Plugin, Plugins, PluginsState};
pub use schedule_runner::{RunMode, ScheduleRunnerPlugin};
pub use sub_app::SubApp;

pub mod prelude {
    pub use crate::{
        App, AppExit, AppLabel, Exit, First, Last, MainSchedulePlugin, Plugin, PostStartup,
        PostUpdate, PreExit, PreStartup, PreUpdate, Runner, ScheduleOrder, ScheduleRunnerPlugin,
        Startup, SubApp, Update,
    };
}
