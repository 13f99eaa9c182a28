use crate::{
    archetype::ArchetypeId,
    entity::Entity,
    query::{
        access::FilteredAccess,
        fetch::QueryData,
        filter::QueryFilter,
    },
    tick::Tick,
    world::World,
};

/// The cached, world-bound state of one query: resolved component ids, the
/// declared access, and the list of matching archetypes.
///
/// The archetype list is refreshed incrementally: archetypes are only ever
/// appended to a world, so the state remembers how many it has inspected.
pub struct QueryState<D: QueryData, F: QueryFilter = ()> {
    data_state: D::State,
    filter_state: F::State,
    component_access: FilteredAccess,
    matched_archetypes: Vec<ArchetypeId>,
    seen_archetypes: usize,
}

impl<D: QueryData, F: QueryFilter> QueryState<D, F> {
    pub fn new(world: &mut World) -> Self {
        let data_state = D::init_state(world);
        let filter_state = F::init_state(world);
        let mut component_access = FilteredAccess::matches_everything();
        D::update_component_access(&data_state, &mut component_access);
        F::update_component_access(&filter_state, &mut component_access);
        let mut state = Self {
            data_state,
            filter_state,
            component_access,
            matched_archetypes: Vec::new(),
            seen_archetypes: 0,
        };
        state.update_archetypes(world);
        state
    }

    /// The access this query declares, used to build its system's access
    /// set.
    pub fn component_access(&self) -> &FilteredAccess {
        &self.component_access
    }

    /// Inspects archetypes added since the last call.
    pub fn update_archetypes(&mut self, world: &World) {
        let archetypes = world.archetypes();
        for index in self.seen_archetypes..archetypes.len() {
            let archetype = archetypes.get(ArchetypeId::new(index)).unwrap();
            if D::matches_archetype(&self.data_state, archetype)
                && F::matches_archetype(&self.filter_state, archetype)
            {
                self.matched_archetypes.push(archetype.id());
            }
        }
        self.seen_archetypes = archetypes.len();
    }

    pub fn iter_mut<'w, 's>(&'s mut self, world: &'w mut World) -> QueryIter<'w, 's, D, F> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.read_change_tick();
        // SAFETY: exclusive world access covers any declared query access.
        unsafe { self.iter_unchecked_manual(world, last_run, this_run) }
    }

    /// # Safety
    /// The caller must guarantee the query's declared access is valid for
    /// the duration of the iterator (no conflicting concurrent access), and
    /// that `update_archetypes` ran against this world.
    pub unsafe fn iter_unchecked_manual<'w, 's>(
        &'s self,
        world: &'w World,
        last_run: Tick,
        this_run: Tick,
    ) -> QueryIter<'w, 's, D, F> {
        QueryIter {
            world,
            state: self,
            archetype_cursor: 0,
            row_cursor: 0,
            last_run,
            this_run,
        }
    }

    pub fn get_mut<'w, 's>(
        &'s mut self,
        world: &'w mut World,
        entity: Entity,
    ) -> Option<D::Item<'w>> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.read_change_tick();
        // SAFETY: exclusive world access.
        unsafe { self.get_unchecked_manual(world, entity, last_run, this_run) }
    }

    /// # Safety
    /// As for [`iter_unchecked_manual`](Self::iter_unchecked_manual).
    pub unsafe fn get_unchecked_manual<'w>(
        &self,
        world: &'w World,
        entity: Entity,
        last_run: Tick,
        this_run: Tick,
    ) -> Option<D::Item<'w>> {
        let location = world.entities().get(entity)?;
        if !self.matched_archetypes.contains(&location.archetype_id) {
            return None;
        }
        Some(D::fetch(
            &self.data_state,
            world,
            entity,
            location,
            last_run,
            this_run,
        ))
    }

    /// Whether `entity` is currently matched by this query.
    pub fn contains(&mut self, world: &World, entity: Entity) -> bool {
        self.update_archetypes(world);
        world
            .entities()
            .get(entity)
            .is_some_and(|location| self.matched_archetypes.contains(&location.archetype_id))
    }

    pub fn is_empty(&mut self, world: &World) -> bool {
        self.update_archetypes(world);
        self.matched_archetypes
            .iter()
            .all(|&id| world.archetypes().get(id).is_none_or(|a| a.is_empty()))
    }

    pub(crate) fn matched_archetypes(&self) -> &[ArchetypeId] {
        &self.matched_archetypes
    }

    pub(crate) fn data_state(&self) -> &D::State {
        &self.data_state
    }
}

/// Iterates the entities of every matched archetype, fetching `D` per row.
pub struct QueryIter<'w, 's, D: QueryData, F: QueryFilter> {
    world: &'w World,
    state: &'s QueryState<D, F>,
    archetype_cursor: usize,
    row_cursor: usize,
    last_run: Tick,
    this_run: Tick,
}

impl<'w, 's, D: QueryData, F: QueryFilter> Iterator for QueryIter<'w, 's, D, F> {
    type Item = D::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archetype_id = *self
                .state
                .matched_archetypes()
                .get(self.archetype_cursor)?;
            let archetype = self.world.archetypes().get(archetype_id)?;
            if self.row_cursor >= archetype.len() {
                self.archetype_cursor += 1;
                self.row_cursor = 0;
                continue;
            }
            let entity = archetype.entities()[self.row_cursor];
            self.row_cursor += 1;
            let location = self
                .world
                .entities()
                .get(entity)
                .expect("archetype members are alive");
            // SAFETY: construction contract of the iterator (see
            // `iter_unchecked_manual`) plus the archetype match.
            return Some(unsafe {
                D::fetch(
                    self.state.data_state(),
                    self.world,
                    entity,
                    location,
                    self.last_run,
                    self.this_run,
                )
            });
        }
    }
}

/// The system-parameter view of a query: a [`QueryState`] borrowed from the
/// system plus the world it runs against.
pub struct Query<'w, 's, D: QueryData, F: QueryFilter = ()> {
    world: &'w World,
    state: &'s mut QueryState<D, F>,
    last_run: Tick,
    this_run: Tick,
}

impl<'w, 's, D: QueryData, F: QueryFilter> Query<'w, 's, D, F> {
    /// # Safety
    /// The state's declared access must have been validated against all
    /// concurrently running systems for `world`.
    pub(crate) unsafe fn new(
        world: &'w World,
        state: &'s mut QueryState<D, F>,
        last_run: Tick,
        this_run: Tick,
    ) -> Self {
        state.update_archetypes(world);
        Self {
            world,
            state,
            last_run,
            this_run,
        }
    }

    /// Iterates all matching entities. Items borrow from the query, so two
    /// overlapping iterations cannot alias.
    pub fn iter(&mut self) -> QueryIter<'_, '_, D, F> {
        // SAFETY: the access was validated when the system was admitted; the
        // &mut borrow serializes iterations within the system.
        unsafe {
            self.state
                .iter_unchecked_manual(self.world, self.last_run, self.this_run)
        }
    }

    /// Fetches the item for one entity, if it matches.
    pub fn get(&mut self, entity: Entity) -> Option<D::Item<'_>> {
        // SAFETY: as for `iter`.
        unsafe {
            self.state
                .get_unchecked_manual(self.world, entity, self.last_run, self.this_run)
        }
    }

    /// Returns the single matching item, or `None` when there are zero or
    /// several.
    pub fn single(&mut self) -> Option<D::Item<'_>> {
        let mut iter = self.iter();
        let first = iter.next()?;
        if iter.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world
            .entities()
            .get(entity)
            .is_some_and(|location| {
                self.state
                    .matched_archetypes()
                    .contains(&location.archetype_id)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.state.matched_archetypes().iter().all(|&id| {
            self.world
                .archetypes()
                .get(id)
                .is_none_or(|archetype| archetype.is_empty())
        })
    }

    /// The number of matching entities.
    pub fn count(&self) -> usize {
        self.state
            .matched_archetypes()
            .iter()
            .map(|&id| {
                self.world
                    .archetypes()
                    .get(id)
                    .map_or(0, |archetype| archetype.len())
            })
            .sum()
    }
}
