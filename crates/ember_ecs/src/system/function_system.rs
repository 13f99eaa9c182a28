use std::borrow::Cow;
use std::marker::PhantomData;

use crate::{
    query::FilteredAccessSet,
    system::{
        param::{SystemParam, SystemParamItem},
        System, SystemMeta,
    },
    tick::Tick,
    world::{UnsafeWorldCell, World},
};

/// What a system function may return. Failures are logged with the system's
/// name and never abort the schedule.
pub trait SystemOutput: 'static {
    fn handle(self, system_name: &str);
}

impl SystemOutput for () {
    fn handle(self, _system_name: &str) {}
}

impl<E: std::fmt::Display + 'static> SystemOutput for Result<(), E> {
    fn handle(self, system_name: &str) {
        if let Err(error) = self {
            log::error!("system `{system_name}` failed: {error}");
        }
    }
}

/// A function callable with system parameter items. Implemented for plain
/// `fn`s and closures over any supported parameter arity.
pub trait SystemParamFunction<Marker>: Send + Sync + 'static {
    type Param: SystemParam + 'static;
    type Out: SystemOutput;

    fn run(&mut self, param: SystemParamItem<'_, '_, Self::Param>) -> Self::Out;
}

macro_rules! impl_system_param_function {
    ($($param:ident),*) => {
        #[allow(non_snake_case)]
        impl<Out, Func, $($param: SystemParam + 'static),*>
            SystemParamFunction<fn($($param,)*) -> Out> for Func
        where
            Out: SystemOutput,
            Func: Send + Sync + 'static,
            for<'a> &'a mut Func:
                FnMut($($param),*) -> Out + FnMut($(SystemParamItem<$param>),*) -> Out,
        {
            type Param = ($($param,)*);
            type Out = Out;

            fn run(&mut self, param: SystemParamItem<'_, '_, Self::Param>) -> Self::Out {
                // Rebinding through `&mut Func` lets the HRTB pick the
                // caller's lifetimes for the parameter items.
                #[allow(clippy::too_many_arguments)]
                fn call_inner<Out, $($param),*>(
                    mut f: impl FnMut($($param),*) -> Out,
                    $($param: $param),*
                ) -> Out {
                    f($($param),*)
                }
                let ($($param,)*) = param;
                call_inner(&mut *self, $($param),*)
            }
        }
    };
}

impl_system_param_function!();
impl_system_param_function!(P0);
impl_system_param_function!(P0, P1);
impl_system_param_function!(P0, P1, P2);
impl_system_param_function!(P0, P1, P2, P3);
impl_system_param_function!(P0, P1, P2, P3, P4);
impl_system_param_function!(P0, P1, P2, P3, P4, P5);
impl_system_param_function!(P0, P1, P2, P3, P4, P5, P6);
impl_system_param_function!(P0, P1, P2, P3, P4, P5, P6, P7);

/// Binds a [`SystemParamFunction`] to its parameter state and access
/// descriptor, making it a [`System`].
pub struct FunctionSystem<Marker, F>
where
    F: SystemParamFunction<Marker>,
{
    func: F,
    state: Option<<F::Param as SystemParam>::State>,
    meta: SystemMeta,
    _marker: PhantomData<fn() -> Marker>,
}

impl<Marker: 'static, F: SystemParamFunction<Marker>> System for FunctionSystem<Marker, F> {
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn access(&self) -> &FilteredAccessSet {
        &self.meta.access
    }

    fn initialize(&mut self, world: &mut World) {
        if self.state.is_none() {
            self.state = Some(F::Param::init_state(world, &mut self.meta));
        }
    }

    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell) {
        // SAFETY: the caller guarantees the declared access is valid, which
        // is exactly what the parameter extractors rely on.
        let world = world.world();
        let change_tick = world.increment_change_tick();
        let state = self
            .state
            .as_mut()
            .expect("system not initialized before run");
        let param = F::Param::get_param(state, &self.meta, world, change_tick);
        let out = self.func.run(param);
        out.handle(&self.meta.name);
        self.meta.last_run = change_tick;
    }

    fn apply_deferred(&mut self, world: &mut World) {
        if let Some(state) = self.state.as_mut() {
            F::Param::apply(state, world);
        }
    }

    fn last_run(&self) -> Tick {
        self.meta.last_run
    }

    fn set_last_run(&mut self, tick: Tick) {
        self.meta.last_run = tick;
    }
}

/// Conversion of functions (and prebuilt systems) into boxed systems.
pub trait IntoSystem<Marker>: Sized {
    type System: System;

    fn into_system(self) -> Self::System;
}

impl<Marker: 'static, F: SystemParamFunction<Marker>> IntoSystem<Marker> for F {
    type System = FunctionSystem<Marker, F>;

    fn into_system(self) -> Self::System {
        FunctionSystem {
            func: self,
            state: None,
            meta: SystemMeta::new(short_type_name::<F>()),
            _marker: PhantomData,
        }
    }
}

/// Marker for the exclusive-system conversion below.
pub struct IsExclusiveSystem;

/// Wraps `fn(&mut World)`. Exclusive systems run on the schedule's driving
/// thread through the dispatcher's world barrier, never in parallel with
/// anything.
pub struct ExclusiveFunctionSystem<F> {
    func: F,
    meta: SystemMeta,
}

impl<F> System for ExclusiveFunctionSystem<F>
where
    F: FnMut(&mut World) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.meta.name
    }

    fn access(&self) -> &FilteredAccessSet {
        &self.meta.access
    }

    fn is_exclusive(&self) -> bool {
        true
    }

    fn initialize(&mut self, _world: &mut World) {
        if self.meta.access.filtered_accesses().is_empty() {
            self.meta.access.add_unfiltered_write_all();
        }
    }

    unsafe fn run_unsafe(&mut self, _world: UnsafeWorldCell) {
        unreachable!(
            "exclusive system `{}` must run with exclusive world access",
            self.meta.name
        );
    }

    fn run(&mut self, world: &mut World) {
        let change_tick = world.increment_change_tick();
        (self.func)(world);
        self.meta.last_run = change_tick;
    }

    fn apply_deferred(&mut self, _world: &mut World) {}

    fn last_run(&self) -> Tick {
        self.meta.last_run
    }

    fn set_last_run(&mut self, tick: Tick) {
        self.meta.last_run = tick;
    }
}

impl<F> IntoSystem<IsExclusiveSystem> for F
where
    F: FnMut(&mut World) + Send + Sync + 'static,
{
    type System = ExclusiveFunctionSystem<F>;

    fn into_system(self) -> Self::System {
        ExclusiveFunctionSystem {
            func: self,
            meta: SystemMeta::new(short_type_name::<F>()),
        }
    }
}

fn short_type_name<T>() -> Cow<'static, str> {
    let name = std::any::type_name::<T>();
    Cow::Borrowed(name.rsplit("::").next().unwrap_or(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detection::ResMut;
    use crate::component::{Component, Resource};
    use crate::query::Query;
    use crate::system::param::Local;

    #[derive(Default)]
    struct Counter(u32);
    impl Resource for Counter {}

    #[derive(Debug, PartialEq)]
    struct Value(u32);
    impl Component for Value {}

    #[test]
    fn function_system_runs_with_params() {
        let mut world = World::new();
        world.insert_resource(Counter(0));
        world.spawn(Value(3));
        world.spawn(Value(4));

        fn sum(mut counter: ResMut<Counter>, mut values: Query<&Value>) {
            for value in values.iter() {
                counter.0 += value.0;
            }
        }

        let mut system = IntoSystem::into_system(sum);
        system.initialize(&mut world);
        system.run(&mut world);
        assert_eq!(world.resource::<Counter>().0, 7);
    }

    #[test]
    fn local_state_persists_between_runs() {
        let mut world = World::new();
        world.insert_resource(Counter(0));

        fn bump(mut local: Local<u32>, mut counter: ResMut<Counter>) {
            *local += 1;
            counter.0 = *local;
        }

        let mut system = IntoSystem::into_system(bump);
        system.initialize(&mut world);
        system.run(&mut world);
        system.run(&mut world);
        assert_eq!(world.resource::<Counter>().0, 2);
    }

    #[test]
    fn fallible_system_failure_is_contained() {
        let mut world = World::new();

        fn failing() -> Result<(), String> {
            Err("expected".to_string())
        }

        let mut system = IntoSystem::into_system(failing);
        system.initialize(&mut world);
        // Does not panic; the error is logged and swallowed.
        system.run(&mut world);
    }

    #[test]
    fn exclusive_system_runs_with_world() {
        let mut world = World::new();
        world.insert_resource(Counter(5));

        let mut system = IntoSystem::into_system(|world: &mut World| {
            world.resource_mut::<Counter>().0 *= 2;
        });
        system.initialize(&mut world);
        assert!(system.is_exclusive());
        system.run(&mut world);
        assert_eq!(world.resource::<Counter>().0, 10);
    }

    #[test]
    fn access_declares_conflicts() {
        let mut world = World::new();
        fn writer(_q: Query<&mut Value>) {}
        fn reader(_q: Query<&Value>) {}
        let mut a = IntoSystem::into_system(writer);
        let mut b = IntoSystem::into_system(reader);
        a.initialize(&mut world);
        b.initialize(&mut world);
        assert!(!a.access().is_compatible(b.access()));

        fn other(_c: ResMut<Counter>) {}
        let mut c = IntoSystem::into_system(other);
        c.initialize(&mut world);
        assert!(a.access().is_compatible(c.access()));
    }
}
