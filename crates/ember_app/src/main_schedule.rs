use ember_ecs::prelude::*;
use ember_ecs::schedule::BoxedScheduleLabel;

use crate::{app::App, plugin::Plugin};

/// The schedule that runs once before [`Startup`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PreStartup;

/// The schedule that runs once when the app starts.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Startup;

/// The schedule that runs once after [`Startup`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PostStartup;

/// Runs first every frame. Event channels rotate here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct First;

/// Engine/plugin preparation work that must precede [`Update`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PreUpdate;

/// Reserved slot for state-machine transitions between [`PreUpdate`] and
/// [`Update`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct StateTransition;

/// The schedule that contains most app logic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Update;

/// Response work reacting to [`Update`] (e.g. bookkeeping sync).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PostUpdate;

/// Runs last every frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Last;

/// Runs once before [`Exit`] when the app terminates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PreExit;

/// Runs once when the app terminates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Exit;

/// Runs once after [`Exit`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PostExit;

/// The label used by render-style sub-apps for their extract schedule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Extract;

/// The ordered sequence of schedule labels one `update` pass runs.
pub struct ScheduleOrder {
    pub labels: Vec<BoxedScheduleLabel>,
}

impl Resource for ScheduleOrder {}

impl Default for ScheduleOrder {
    fn default() -> Self {
        Self { labels: Vec::new() }
    }
}

impl ScheduleOrder {
    pub fn push(&mut self, label: impl ScheduleLabel) {
        self.labels.push(Box::new(label));
    }

    /// Inserts `label` immediately after `after`. Panics if `after` is not
    /// present.
    pub fn insert_after(&mut self, after: impl ScheduleLabel, label: impl ScheduleLabel) {
        let target: &dyn ScheduleLabel = &after;
        let index = self
            .labels
            .iter()
            .position(|current| **current == *target)
            .unwrap_or_else(|| panic!("expected schedule {target:?} to be in the order"));
        self.labels.insert(index + 1, Box::new(label));
    }

    /// Inserts `label` immediately before `before`. Panics if `before` is
    /// not present.
    pub fn insert_before(&mut self, before: impl ScheduleLabel, label: impl ScheduleLabel) {
        let target: &dyn ScheduleLabel = &before;
        let index = self
            .labels
            .iter()
            .position(|current| **current == *target)
            .unwrap_or_else(|| panic!("expected schedule {target:?} to be in the order"));
        self.labels.insert(index, Box::new(label));
    }
}

/// Installs the canonical schedules and their execution order:
/// `PreStartup, Startup, PostStartup` (run-once, direct command apply),
/// `First, PreUpdate, StateTransition, Update, PostUpdate, Last`, plus the
/// run-once `PreExit, Exit, PostExit` triple executed by the runner on
/// termination.
pub struct MainSchedulePlugin;

impl Plugin for MainSchedulePlugin {
    fn build(&self, app: &mut App) {
        let startup = ExecuteConfig {
            apply_direct: true,
            run_once: true,
        };
        let exit = ExecuteConfig {
            apply_direct: false,
            run_once: true,
        };
        app.add_schedule(Schedule::new(PreStartup).with_execute_config(startup))
            .add_schedule(Schedule::new(Startup).with_execute_config(startup))
            .add_schedule(Schedule::new(PostStartup).with_execute_config(startup))
            .add_schedule(Schedule::new(First))
            .add_schedule(Schedule::new(PreUpdate))
            .add_schedule(Schedule::new(StateTransition))
            .add_schedule(Schedule::new(Update))
            .add_schedule(Schedule::new(PostUpdate))
            .add_schedule(Schedule::new(Last))
            .add_schedule(Schedule::new(PreExit).with_execute_config(exit))
            .add_schedule(Schedule::new(Exit).with_execute_config(exit))
            .add_schedule(Schedule::new(PostExit).with_execute_config(exit));

        let mut order = ScheduleOrder::default();
        order.push(PreStartup);
        order.push(Startup);
        order.push(PostStartup);
        order.push(First);
        order.push(PreUpdate);
        order.push(StateTransition);
        order.push(Update);
        order.push(PostUpdate);
        order.push(Last);
        app.insert_resource(order);
    }
}
