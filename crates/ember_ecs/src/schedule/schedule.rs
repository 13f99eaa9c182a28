use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{
    component::Resource,
    error::ScheduleBuildError,
    query::FilteredAccessSet,
    schedule::{
        config::{IntoSetConfigs, IntoSystemConfigs, SetConfig},
        dispatcher::SystemDispatcher,
        label::{BoxedScheduleLabel, BoxedSystemSet, ScheduleLabel},
    },
    system::BoxedSystem,
    tick::Tick,
    world::{UnsafeWorldCell, World},
};

/// How a schedule is executed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteConfig {
    /// Run systems one at a time, applying each system's command queue
    /// immediately, so later systems in the same schedule observe earlier
    /// deferred mutations. Used by the startup schedules.
    pub apply_direct: bool,
    /// Skip the schedule after its first successful run.
    pub run_once: bool,
}

struct ScheduleSystemNode {
    system: Arc<Mutex<BoxedSystem>>,
    sets: Vec<BoxedSystemSet>,
    before: Vec<BoxedSystemSet>,
    after: Vec<BoxedSystemSet>,
}

struct Executable {
    /// Topological order of system indices.
    order: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    dependency_counts: Vec<usize>,
}

/// A named collection of systems, sets and ordering edges.
///
/// Building (`initialize`) lowers set relations to transitive system edges,
/// topologically sorts the graph (rejecting cycles with a diagnostic naming
/// the path), and computes predecessor counts for the runner.
pub struct Schedule {
    label: BoxedScheduleLabel,
    systems: Vec<ScheduleSystemNode>,
    set_configs: Vec<SetConfig>,
    direct_edges: Vec<(usize, usize)>,
    execute_config: ExecuteConfig,
    executable: Option<Executable>,
    initialized_systems: usize,
    ran: bool,
    warned_pairs: HashSet<(usize, usize)>,
}

impl Schedule {
    pub fn new(label: impl ScheduleLabel) -> Self {
        Self {
            label: Box::new(label),
            systems: Vec::new(),
            set_configs: Vec::new(),
            direct_edges: Vec::new(),
            execute_config: ExecuteConfig::default(),
            executable: None,
            initialized_systems: 0,
            ran: false,
            warned_pairs: HashSet::new(),
        }
    }

    pub fn with_execute_config(mut self, config: ExecuteConfig) -> Self {
        self.execute_config = config;
        self
    }

    #[inline]
    pub fn label(&self) -> &dyn ScheduleLabel {
        &*self.label
    }

    #[inline]
    pub fn execute_config(&self) -> ExecuteConfig {
        self.execute_config
    }

    /// Whether a `run_once` schedule has already run.
    #[inline]
    pub fn has_run(&self) -> bool {
        self.ran
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn add_systems<M>(&mut self, configs: impl IntoSystemConfigs<M>) -> &mut Self {
        let configs = configs.into_configs();
        let first_index = self.systems.len();
        let chained = configs.chained;
        for config in configs.configs {
            self.systems.push(ScheduleSystemNode {
                system: Arc::new(Mutex::new(config.system)),
                sets: config.sets,
                before: config.before,
                after: config.after,
            });
        }
        if chained {
            for index in first_index..self.systems.len().saturating_sub(1) {
                self.direct_edges.push((index, index + 1));
            }
        }
        self.executable = None;
        self
    }

    pub fn configure_sets<M>(&mut self, configs: impl IntoSetConfigs<M>) -> &mut Self {
        let configs = configs.into_set_configs();
        let chained = configs.chained;
        let mut incoming = configs.configs;
        if chained {
            for index in 1..incoming.len() {
                let previous = incoming[index - 1].set.clone();
                incoming[index].after.push(previous);
            }
        }
        self.set_configs.extend(incoming);
        self.executable = None;
        self
    }

    /// Resolves systems against the world and (re)builds the execution
    /// graph.
    pub fn initialize(&mut self, world: &mut World) -> Result<(), ScheduleBuildError> {
        for node in &mut self.systems[self.initialized_systems..] {
            node.system.lock().initialize(world);
        }
        self.initialized_systems = self.systems.len();
        if self.executable.is_none() {
            self.build_executable(world)?;
        }
        Ok(())
    }

    fn build_executable(&mut self, world: &World) -> Result<(), ScheduleBuildError> {
        let system_count = self.systems.len();

        // Set membership, including each system's implicit type set.
        let mut members: HashMap<BoxedSystemSet, Vec<usize>> = HashMap::new();
        for (index, node) in self.systems.iter().enumerate() {
            for set in &node.sets {
                members.entry(set.clone()).or_default().push(index);
            }
        }
        let resolve = |set: &BoxedSystemSet| -> &[usize] {
            members.get(set).map(Vec::as_slice).unwrap_or(&[])
        };

        let mut edges: HashSet<(usize, usize)> = self.direct_edges.iter().copied().collect();
        for (index, node) in self.systems.iter().enumerate() {
            for target in &node.before {
                for &member in resolve(target) {
                    if member != index {
                        edges.insert((index, member));
                    }
                }
            }
            for target in &node.after {
                for &member in resolve(target) {
                    if member != index {
                        edges.insert((member, index));
                    }
                }
            }
        }
        // Lower set-level relations to pairwise system edges.
        for config in &self.set_configs {
            let sources = resolve(&config.set).to_vec();
            for target in &config.before {
                for &a in &sources {
                    for &b in resolve(target) {
                        if a != b {
                            edges.insert((a, b));
                        }
                    }
                }
            }
            for target in &config.after {
                for &b in &sources {
                    for &a in resolve(target) {
                        if a != b {
                            edges.insert((a, b));
                        }
                    }
                }
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); system_count];
        let mut dependency_counts = vec![0usize; system_count];
        for &(from, to) in &edges {
            dependents[from].push(to);
            dependency_counts[to] += 1;
        }

        // Kahn's algorithm; leftovers participate in a cycle.
        let mut counts = dependency_counts.clone();
        let mut queue: VecDeque<usize> = (0..system_count).filter(|&i| counts[i] == 0).collect();
        let mut order = Vec::with_capacity(system_count);
        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &dep in &dependents[index] {
                counts[dep] -= 1;
                if counts[dep] == 0 {
                    queue.push_back(dep);
                }
            }
        }
        if order.len() != system_count {
            let path = self.find_cycle(&dependents, &counts);
            return Err(ScheduleBuildError::Cycle { path });
        }

        self.warn_ambiguities(world, &dependents, system_count);

        self.executable = Some(Executable {
            order,
            dependents,
            dependency_counts,
        });
        Ok(())
    }

    fn find_cycle(&self, dependents: &[Vec<usize>], counts: &[usize]) -> Vec<String> {
        // Walk forward from any node still blocked until a node repeats.
        let start = (0..counts.len()).find(|&i| counts[i] > 0).unwrap_or(0);
        let mut seen: Vec<usize> = Vec::new();
        let mut current = start;
        loop {
            if let Some(position) = seen.iter().position(|&n| n == current) {
                let mut path: Vec<String> = seen[position..]
                    .iter()
                    .map(|&i| self.systems[i].system.lock().name().to_string())
                    .collect();
                path.push(path[0].clone());
                return path;
            }
            seen.push(current);
            current = *dependents[current]
                .iter()
                .find(|&&next| counts[next] > 0 || dependents[next].iter().any(|&n| counts[n] > 0))
                .or_else(|| dependents[current].first())
                .unwrap_or(&start);
        }
    }

    /// Warns once per unordered pair with conflicting access. The pair is
    /// still executed safely: the dispatcher serializes it in
    /// becomes-ready order.
    fn warn_ambiguities(&mut self, world: &World, dependents: &[Vec<usize>], count: usize) {
        // Transitive reachability, O(V * E); schedules are small.
        let mut reachable = vec![HashSet::new(); count];
        for start in 0..count {
            let mut stack: Vec<usize> = dependents[start].clone();
            while let Some(next) = stack.pop() {
                if reachable[start].insert(next) {
                    stack.extend(dependents[next].iter().copied());
                }
            }
        }
        for a in 0..count {
            for b in (a + 1)..count {
                if reachable[a].contains(&b)
                    || reachable[b].contains(&a)
                    || self.warned_pairs.contains(&(a, b))
                {
                    continue;
                }
                let system_a = self.systems[a].system.lock();
                let system_b = self.systems[b].system.lock();
                if system_a.is_exclusive() || system_b.is_exclusive() {
                    // Exclusive systems conflict with everything by
                    // definition; the barrier serializes them.
                    continue;
                }
                if !system_a.access().is_compatible(system_b.access()) {
                    let conflicts = system_a.access().get_conflicts(system_b.access());
                    let names: Vec<String> = conflicts
                        .ids()
                        .iter()
                        .map(|&id| world.registry().name(id))
                        .collect();
                    log::warn!(
                        "schedule {:?}: systems `{}` and `{}` are unordered but conflict on {}; \
                         execution order will follow readiness",
                        self.label,
                        system_a.name(),
                        system_b.name(),
                        if names.is_empty() {
                            "an unbounded access".to_string()
                        } else {
                            format!("{names:?}")
                        },
                    );
                    drop(system_a);
                    drop(system_b);
                    self.warned_pairs.insert((a, b));
                }
            }
        }
    }

    /// Runs the schedule sequentially with exclusive world access, applying
    /// each system's deferred commands immediately after it runs.
    pub fn run(&mut self, world: &mut World) {
        if self.execute_config.run_once && self.ran {
            return;
        }
        if let Err(error) = self.initialize(world) {
            panic!("failed to build schedule {:?}: {error}", self.label);
        }
        let order = self.executable.as_ref().unwrap().order.clone();
        for index in order {
            self.systems[index].system.lock().run(world);
        }
        self.ran = true;
    }

    /// Runs the schedule on the dispatcher, admitting systems as their
    /// dependencies complete while the dispatcher enforces access
    /// compatibility. Deferred command queues are applied afterwards, in
    /// topological order, before this function returns.
    pub fn execute(&mut self, dispatcher: &SystemDispatcher) {
        if self.execute_config.run_once && self.ran {
            return;
        }
        let build_result = dispatcher.world_scope(|world| self.initialize(world));
        if let Err(error) = build_result {
            panic!("failed to build schedule {:?}: {error}", self.label);
        }
        if self.execute_config.apply_direct {
            dispatcher.world_scope(|world| {
                let order = self.executable.as_ref().unwrap().order.clone();
                for index in order {
                    self.systems[index].system.lock().run(world);
                }
            });
            self.ran = true;
            return;
        }

        let executable = self.executable.as_ref().unwrap();
        let shared = Arc::new(ExecShared {
            systems: self.systems.iter().map(|n| n.system.clone()).collect(),
            accesses: self
                .systems
                .iter()
                .map(|n| Arc::new(n.system.lock().access().clone()))
                .collect(),
            names: self
                .systems
                .iter()
                .map(|n| Arc::from(n.system.lock().name()))
                .collect(),
            exclusive: self
                .systems
                .iter()
                .map(|n| n.system.lock().is_exclusive())
                .collect(),
            dependents: executable.dependents.clone(),
        });
        let sync = Arc::new(ExecSync {
            state: Mutex::new(ExecState {
                counts: executable.dependency_counts.clone(),
                remaining: self.systems.len(),
                ready_exclusive: Vec::new(),
            }),
            condvar: Condvar::new(),
        });

        let initially_ready: Vec<usize> = {
            let state = sync.state.lock();
            (0..self.systems.len())
                .filter(|&i| state.counts[i] == 0)
                .collect()
        };
        for index in initially_ready {
            if shared.exclusive[index] {
                sync.state.lock().ready_exclusive.push(index);
            } else {
                dispatch_system(&shared, &sync, dispatcher, index);
            }
        }

        loop {
            let mut state = sync.state.lock();
            if state.remaining == 0 {
                break;
            }
            if let Some(index) = state.ready_exclusive.pop() {
                drop(state);
                dispatcher.world_scope(|world| {
                    shared.systems[index].lock().run(world);
                });
                finish_system(&shared, &sync, dispatcher, index);
                continue;
            }
            if sync
                .condvar
                .wait_for(&mut state, Duration::from_secs(1))
                .timed_out()
                && state.remaining > 0
                && dispatcher.running_count() == 0
                && state.ready_exclusive.is_empty()
            {
                let stuck: Vec<&str> = (0..shared.systems.len())
                    .filter(|&i| state.counts[i] > 0)
                    .map(|i| shared.names[i].as_ref())
                    .collect();
                log::warn!(
                    "schedule {:?}: {} system(s) still waiting with nothing running: {stuck:?}",
                    self.label,
                    state.remaining,
                );
            }
        }

        let order = executable.order.clone();
        dispatcher.world_scope(|world| {
            for index in order {
                shared.systems[index].lock().apply_deferred(world);
            }
        });
        self.ran = true;
    }

    pub fn check_change_tick(&mut self, change_tick: Tick) {
        for node in &self.systems {
            node.system.lock().check_change_tick(change_tick);
        }
    }
}

struct ExecShared {
    systems: Vec<Arc<Mutex<BoxedSystem>>>,
    accesses: Vec<Arc<FilteredAccessSet>>,
    names: Vec<Arc<str>>,
    exclusive: Vec<bool>,
    dependents: Vec<Vec<usize>>,
}

struct ExecState {
    counts: Vec<usize>,
    remaining: usize,
    ready_exclusive: Vec<usize>,
}

struct ExecSync {
    state: Mutex<ExecState>,
    condvar: Condvar,
}

fn dispatch_system(
    shared: &Arc<ExecShared>,
    sync: &Arc<ExecSync>,
    dispatcher: &SystemDispatcher,
    index: usize,
) {
    let shared_task = shared.clone();
    let sync_task = sync.clone();
    let dispatcher_task = dispatcher.clone();
    dispatcher.dispatch(
        shared.accesses[index].clone(),
        shared.names[index].clone(),
        Box::new(move |world| {
            let cell = UnsafeWorldCell::new_readonly(world);
            // A panicking system must not leave the schedule counting on a
            // completion that never happens; contain it, log, move on.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                // SAFETY: the dispatcher admitted this system against every
                // running access, which is exactly the discipline the
                // system's declared access requires.
                unsafe { shared_task.systems[index].lock().run_unsafe(cell) };
            }));
            if result.is_err() {
                log::error!(
                    "system `{}` panicked and was skipped",
                    shared_task.names[index]
                );
            }
            finish_system(&shared_task, &sync_task, &dispatcher_task, index);
        }),
    );
}

fn finish_system(
    shared: &Arc<ExecShared>,
    sync: &Arc<ExecSync>,
    dispatcher: &SystemDispatcher,
    index: usize,
) {
    let mut newly_ready = Vec::new();
    {
        let mut state = sync.state.lock();
        state.remaining -= 1;
        for &dependent in &shared.dependents[index] {
            state.counts[dependent] -= 1;
            if state.counts[dependent] == 0 {
                if shared.exclusive[dependent] {
                    state.ready_exclusive.push(dependent);
                } else {
                    newly_ready.push(dependent);
                }
            }
        }
        sync.condvar.notify_all();
    }
    for dependent in newly_ready {
        dispatch_system(shared, sync, dispatcher, dependent);
    }
}

/// The world's registry of schedules, keyed by label.
#[derive(Default)]
pub struct Schedules {
    map: HashMap<BoxedScheduleLabel, Schedule>,
}

impl Resource for Schedules {}

impl Schedules {
    /// Inserts a schedule, replacing (with a warning) any schedule already
    /// registered under the same label.
    pub fn insert(&mut self, schedule: Schedule) {
        let label = schedule.label.clone();
        if self.map.contains_key(&label) {
            log::warn!("schedule {label:?} already exists and will be overwritten");
        }
        self.map.insert(label, schedule);
    }

    pub fn contains(&self, label: &dyn ScheduleLabel) -> bool {
        self.map.contains_key(label)
    }

    pub fn get(&self, label: &dyn ScheduleLabel) -> Option<&Schedule> {
        self.map.get(label)
    }

    pub fn get_mut(&mut self, label: &dyn ScheduleLabel) -> Option<&mut Schedule> {
        self.map.get_mut(label)
    }

    pub fn remove(&mut self, label: &dyn ScheduleLabel) -> Option<Schedule> {
        self.map.remove(label)
    }

    pub fn entry(&mut self, label: impl ScheduleLabel + Clone) -> &mut Schedule {
        self.map
            .entry(Box::new(label.clone()))
            .or_insert_with(|| Schedule::new(label))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Schedule> {
        self.map.values_mut()
    }

    pub fn check_change_tick(&mut self, change_tick: Tick) {
        for schedule in self.map.values_mut() {
            schedule.check_change_tick(change_tick);
        }
    }
}
