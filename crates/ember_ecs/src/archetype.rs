use fxhash::FxHashMap;

use crate::{
    component::{ComponentId, StorageType},
    entity::Entity,
    storage::TableId,
};

/// Identifies an [`Archetype`] within [`Archetypes`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// The archetype of entities with no components.
    pub const EMPTY: Self = Self(0);
    pub const INVALID: Self = Self(u32::MAX);

    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Memoized destinations for single-component add/remove moves out of one
/// archetype. `None` values are never cached; absence means "not computed
/// yet".
#[derive(Default)]
pub struct Edges {
    add: FxHashMap<ComponentId, ArchetypeId>,
    remove: FxHashMap<ComponentId, ArchetypeId>,
}

impl Edges {
    #[inline]
    pub fn get_add(&self, component_id: ComponentId) -> Option<ArchetypeId> {
        self.add.get(&component_id).copied()
    }

    #[inline]
    pub fn cache_add(&mut self, component_id: ComponentId, archetype_id: ArchetypeId) {
        self.add.insert(component_id, archetype_id);
    }

    #[inline]
    pub fn get_remove(&self, component_id: ComponentId) -> Option<ArchetypeId> {
        self.remove.get(&component_id).copied()
    }

    #[inline]
    pub fn cache_remove(&mut self, component_id: ComponentId, archetype_id: ArchetypeId) {
        self.remove.insert(component_id, archetype_id);
    }
}

/// An exact set of component types. Every entity with that set belongs to
/// this archetype; its `Table`-class components share one table.
pub struct Archetype {
    id: ArchetypeId,
    table_id: TableId,
    /// All component ids, sorted.
    components: Vec<ComponentId>,
    table_components: Vec<ComponentId>,
    sparse_set_components: Vec<ComponentId>,
    entities: Vec<Entity>,
    edges: Edges,
}

impl Archetype {
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    #[inline]
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    #[inline]
    pub fn table_components(&self) -> &[ComponentId] {
        &self.table_components
    }

    #[inline]
    pub fn sparse_set_components(&self) -> &[ComponentId] {
        &self.sparse_set_components
    }

    #[inline]
    pub fn contains(&self, component_id: ComponentId) -> bool {
        self.components.binary_search(&component_id).is_ok()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    pub fn edges(&self) -> &Edges {
        &self.edges
    }

    #[inline]
    pub fn edges_mut(&mut self) -> &mut Edges {
        &mut self.edges
    }

    /// Records `entity` as a member, returning its archetype row.
    pub(crate) fn allocate(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Swap-removes the member at `row`; returns the entity moved into the
    /// row, if any.
    pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        let is_last = row == self.entities.len() - 1;
        self.entities.swap_remove(row);
        (!is_last).then(|| self.entities[row])
    }
}

/// Interns archetypes by their exact component set.
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    ids: FxHashMap<Vec<ComponentId>, ArchetypeId>,
}

impl Default for Archetypes {
    fn default() -> Self {
        let mut archetypes = Self {
            archetypes: Vec::new(),
            ids: FxHashMap::default(),
        };
        archetypes.insert(Vec::new(), TableId::EMPTY, Vec::new(), Vec::new());
        archetypes
    }
}

impl Archetypes {
    /// Looks up the archetype for exactly `components` (sorted), if interned.
    pub fn get_id(&self, components: &[ComponentId]) -> Option<ArchetypeId> {
        self.ids.get(components).copied()
    }

    pub(crate) fn insert(
        &mut self,
        components: Vec<ComponentId>,
        table_id: TableId,
        table_components: Vec<ComponentId>,
        sparse_set_components: Vec<ComponentId>,
    ) -> ArchetypeId {
        debug_assert!(components.windows(2).all(|w| w[0] < w[1]));
        if let Some(&id) = self.ids.get(&components) {
            return id;
        }
        let id = ArchetypeId::new(self.archetypes.len());
        self.ids.insert(components.clone(), id);
        self.archetypes.push(Archetype {
            id,
            table_id,
            components,
            table_components,
            sparse_set_components,
            entities: Vec::new(),
            edges: Edges::default(),
        });
        id
    }

    #[inline]
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Splits a sorted component set by storage class.
    pub(crate) fn split_by_storage(
        components: &[ComponentId],
        storage_type: impl Fn(ComponentId) -> StorageType,
    ) -> (Vec<ComponentId>, Vec<ComponentId>) {
        let mut table = Vec::new();
        let mut sparse = Vec::new();
        for &id in components {
            match storage_type(id) {
                StorageType::Table => table.push(id),
                StorageType::SparseSet => sparse.push(id),
            }
        }
        (table, sparse)
    }
}
