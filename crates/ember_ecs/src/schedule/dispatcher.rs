use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::{query::FilteredAccessSet, world::World};

/// Shared handle to the thread pool systems run on.
pub type SystemPool = Arc<rayon::ThreadPool>;

/// A task admitted to the pool: its access snapshot, a label for
/// diagnostics, and the closure to run.
struct PendingSystem {
    access: Arc<FilteredAccessSet>,
    name: Arc<str>,
    func: Box<dyn FnOnce(&World) + Send>,
}

#[derive(Default)]
struct DispatchState {
    pending: VecDeque<PendingSystem>,
    /// One access snapshot per active slot; `None` marks a free slot.
    running_accesses: Vec<Option<Arc<FilteredAccessSet>>>,
    free_indices: SmallVec<[usize; 8]>,
    running: usize,
    /// Barriers waiting for exclusive world access; admission pauses while
    /// any are queued.
    barriers: usize,
}

struct DispatcherShared {
    pool: Arc<rayon::ThreadPool>,
    world: Arc<World>,
    state: Mutex<DispatchState>,
    condvar: Condvar,
}

/// Admits systems to a shared thread pool while enforcing access
/// compatibility.
///
/// Dispatched systems wait in a FIFO; [`tick`](Self::tick) admits from the
/// front while the head is compatible with every running access. Completion
/// frees the slot and re-enters admission, so two unordered systems with
/// conflicting accesses are serialized in the order they became ready.
///
/// The dispatcher owns the world for its lifetime; [`world_scope`]
/// (Self::world_scope) provides barrier-style exclusive access and
/// [`into_world`](Self::into_world) returns ownership after draining.
#[derive(Clone)]
pub struct SystemDispatcher {
    shared: Arc<DispatcherShared>,
}

impl SystemDispatcher {
    pub fn new(world: World, pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            shared: Arc::new(DispatcherShared {
                pool,
                world: Arc::new(world),
                state: Mutex::new(DispatchState::default()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Builds the default pool for system execution.
    pub fn default_pool() -> Arc<rayon::ThreadPool> {
        Arc::new(
            rayon::ThreadPoolBuilder::new()
                .thread_name(|index| format!("ember-system-{index}"))
                .build()
                .expect("failed to build system thread pool"),
        )
    }

    /// Enqueues a system closure. It will run on the pool once its access
    /// set is compatible with everything already running.
    pub fn dispatch(
        &self,
        access: Arc<FilteredAccessSet>,
        name: Arc<str>,
        func: Box<dyn FnOnce(&World) + Send>,
    ) {
        let mut state = self.shared.state.lock();
        state.pending.push_back(PendingSystem { access, name, func });
        self.tick(&mut state);
    }

    fn tick(&self, state: &mut DispatchState) {
        if state.barriers > 0 {
            return;
        }
        while let Some(front) = state.pending.front() {
            let compatible = state
                .running_accesses
                .iter()
                .flatten()
                .all(|running| front.access.is_compatible(running));
            if !compatible {
                break;
            }
            let PendingSystem { access, name, func } = state.pending.pop_front().unwrap();
            let index = state.free_indices.pop().unwrap_or_else(|| {
                state.running_accesses.push(None);
                state.running_accesses.len() - 1
            });
            state.running_accesses[index] = Some(access);
            state.running += 1;
            let dispatcher = self.clone();
            self.shared.pool.spawn(move || {
                log::trace!("running system `{name}`");
                func(&dispatcher.shared.world);
                dispatcher.finish(index);
            });
        }
    }

    fn finish(&self, index: usize) {
        let mut state = self.shared.state.lock();
        state.running_accesses[index] = None;
        state.free_indices.push(index);
        state.running -= 1;
        self.shared.condvar.notify_all();
        self.tick(&mut state);
    }

    /// Runs `f` with exclusive world access once every running system has
    /// finished. Admission of pending systems pauses until `f` returns.
    ///
    /// `f` must not call back into this dispatcher.
    pub fn world_scope<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        let mut state = self.shared.state.lock();
        state.barriers += 1;
        while state.running > 0 {
            self.shared.condvar.wait(&mut state);
        }
        // SAFETY: no system is running (running == 0) and admission is
        // paused (barriers > 0), so no other reference into the world exists
        // while `f` runs; the state lock is held throughout.
        let world = unsafe { &mut *(Arc::as_ptr(&self.shared.world) as *mut World) };
        let result = f(world);
        state.barriers -= 1;
        self.tick(&mut state);
        self.shared.condvar.notify_all();
        result
    }

    /// Waits until nothing is running or pending. Returns `false` on
    /// timeout, with the waiting set logged for deadlock diagnostics.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        let deadline = std::time::Instant::now() + timeout;
        while state.running > 0 || !state.pending.is_empty() {
            if self
                .shared
                .condvar
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.running == 0 && !state.pending.is_empty() {
                    let waiting: Vec<&str> =
                        state.pending.iter().map(|p| p.name.as_ref()).collect();
                    log::warn!(
                        "dispatcher stalled: nothing running but systems are waiting: {waiting:?}"
                    );
                }
                return false;
            }
        }
        true
    }

    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while state.running > 0 || !state.pending.is_empty() {
            self.shared.condvar.wait(&mut state);
        }
    }

    /// The number of currently running systems.
    pub fn running_count(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Drains all work and returns the world. Panics if other dispatcher
    /// handles are still alive.
    pub fn into_world(self) -> World {
        self.wait_idle();
        // Completed pool tasks may still be dropping their dispatcher
        // clones; spin briefly until ours is the last.
        let mut shared = self.shared;
        let shared = loop {
            match Arc::try_unwrap(shared) {
                Ok(inner) => break inner,
                Err(still_shared) => {
                    shared = still_shared;
                    std::thread::yield_now();
                }
            }
        };
        let world = shared.world.clone();
        drop(shared);
        Arc::try_unwrap(world)
            .ok()
            .expect("world still borrowed by a finished task")
    }
}

impl Drop for DispatcherShared {
    fn drop(&mut self) {
        // By construction every task holds a dispatcher clone, so the last
        // drop can only happen with nothing running.
        debug_assert_eq!(self.state.get_mut().running, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Resource;
    use crate::query::FilteredAccessSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Log(Vec<u32>);
    impl Resource for Log {}

    fn compatible_access() -> Arc<FilteredAccessSet> {
        Arc::new(FilteredAccessSet::default())
    }

    fn conflicting_access(id: usize) -> Arc<FilteredAccessSet> {
        let mut set = FilteredAccessSet::default();
        set.add_unfiltered_resource_write(crate::component::ComponentId::new(id));
        Arc::new(set)
    }

    fn test_pool() -> Arc<rayon::ThreadPool> {
        Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(4)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn compatible_systems_all_run() {
        let dispatcher = SystemDispatcher::new(World::new(), test_pool());
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = counter.clone();
            dispatcher.dispatch(
                compatible_access(),
                Arc::from("count"),
                Box::new(move |_world| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        dispatcher.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn conflicting_systems_never_overlap() {
        let dispatcher = SystemDispatcher::new(World::new(), test_pool());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            dispatcher.dispatch(
                conflicting_access(0),
                Arc::from("conflict"),
                Box::new(move |_world| {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(2));
                    active.fetch_sub(1, Ordering::SeqCst);
                }),
            );
        }
        dispatcher.wait_idle();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn world_scope_waits_for_running_systems() {
        let mut world = World::new();
        world.insert_resource(Log(Vec::new()));
        let dispatcher = SystemDispatcher::new(world, test_pool());
        let started = Arc::new(AtomicUsize::new(0));
        for i in 0..4 {
            let started = started.clone();
            dispatcher.dispatch(
                compatible_access(),
                Arc::from("writer"),
                Box::new(move |world| {
                    started.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(3));
                    // Resource lock keeps this write well-formed.
                    world.resources().get_mut::<Log>(
                        world.registry().resource_id::<Log>().unwrap(),
                    )
                    .unwrap()
                    .0
                    .push(i);
                }),
            );
        }
        let len = dispatcher.world_scope(|world| world.resource::<Log>().0.len());
        // The barrier saw a consistent world: every started system had
        // finished its write.
        assert!(len <= 4);
        dispatcher.wait_idle();
        let world = dispatcher.into_world();
        assert_eq!(world.resource::<Log>().0.len(), 4);
    }

    #[test]
    fn into_world_returns_ownership() {
        let mut world = World::new();
        world.insert_resource(Log(vec![7]));
        let dispatcher = SystemDispatcher::new(world, test_pool());
        dispatcher.dispatch(
            compatible_access(),
            Arc::from("noop"),
            Box::new(|_world| {}),
        );
        let world = dispatcher.into_world();
        assert_eq!(world.resource::<Log>().0, vec![7]);
    }
}
