//! Systems: functions bound to parameter extractors and an access
//! descriptor.

mod function_system;
mod param;

pub use function_system::{
    ExclusiveFunctionSystem, FunctionSystem, IntoSystem, IsExclusiveSystem, SystemOutput,
    SystemParamFunction,
};
pub use param::{EventReader, EventWriter, Local, SystemParam, SystemParamItem};

use std::borrow::Cow;

use crate::{
    query::FilteredAccessSet,
    tick::Tick,
    world::{UnsafeWorldCell, World},
};

/// Metadata shared by all system flavors: a debug name, the combined access
/// set of every parameter, and the tick of the system's previous run (the
/// baseline for change detection).
pub struct SystemMeta {
    pub(crate) name: Cow<'static, str>,
    pub(crate) access: FilteredAccessSet,
    pub(crate) last_run: Tick,
}

impl SystemMeta {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            access: FilteredAccessSet::default(),
            last_run: Tick::default(),
        }
    }
}

/// A runnable unit of work with declared data access.
///
/// Systems are stored type-erased in schedules. Non-exclusive systems run
/// through [`run_unsafe`](System::run_unsafe) on pool threads under the
/// dispatcher's compatibility discipline; exclusive systems require
/// [`run`](System::run) with `&mut World`.
pub trait System: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// The combined access of all parameters. Valid after
    /// [`initialize`](System::initialize).
    fn access(&self) -> &FilteredAccessSet;

    /// Exclusive systems take `&mut World` and never run in parallel with
    /// any other system.
    fn is_exclusive(&self) -> bool {
        false
    }

    /// Resolves parameters against the world, producing state and access.
    fn initialize(&mut self, world: &mut World);

    /// Runs the system with shared world access.
    ///
    /// # Safety
    /// The system's declared access must be compatible with every other
    /// access running concurrently, and `initialize` must have been called
    /// on the same world.
    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell);

    /// Runs the system with exclusive world access, then applies deferred
    /// work.
    fn run(&mut self, world: &mut World) {
        let cell = UnsafeWorldCell::new_mutable(world);
        // SAFETY: exclusive access subsumes any declared access.
        unsafe { self.run_unsafe(cell) };
        self.apply_deferred(world);
    }

    /// Applies deferred parameter effects (command queues).
    fn apply_deferred(&mut self, world: &mut World);

    fn last_run(&self) -> Tick;

    fn set_last_run(&mut self, tick: Tick);

    /// Clamps retained ticks against the current change tick (wraparound
    /// guard).
    fn check_change_tick(&mut self, change_tick: Tick) {
        let mut last_run = self.last_run();
        last_run.check_tick(change_tick);
        self.set_last_run(last_run);
    }
}

pub type BoxedSystem = Box<dyn System>;
