use fxhash::FxHashMap;

use crate::{
    component::{ComponentId, ComponentInfo},
    entity::Entity,
    storage::blob_vec::BlobVec,
    tick::{ComponentTicks, Tick, TickCell},
};

/// Identifies a [`Table`] within [`Tables`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TableId(u32);

impl TableId {
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

/// A packed column of one component type plus its per-slot change ticks.
pub struct Column {
    data: BlobVec,
    added_ticks: Vec<TickCell>,
    changed_ticks: Vec<TickCell>,
}

impl Column {
    pub fn new(info: &ComponentInfo) -> Self {
        Self {
            data: BlobVec::new(info.layout(), info.drop()),
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// # Safety
    /// `value` must own a value of the column's type; caller forgets it.
    pub unsafe fn push(&mut self, value: *const u8, ticks: ComponentTicks) {
        self.data.push(value);
        self.added_ticks.push(TickCell::new(ticks.added));
        self.changed_ticks.push(TickCell::new(ticks.changed));
    }

    /// # Safety
    /// `row < len`; `value` as in [`push`](Self::push).
    pub unsafe fn replace(&mut self, row: usize, value: *const u8, change_tick: Tick) {
        self.data.replace(row, value);
        self.changed_ticks[row].set(change_tick);
    }

    /// # Safety
    /// `row < len`; writes require proven exclusive access.
    #[inline]
    pub unsafe fn get_ptr(&self, row: usize) -> *mut u8 {
        self.data.get_ptr(row)
    }

    /// # Safety
    /// `row < len`.
    #[inline]
    pub unsafe fn get_ticks(&self, row: usize) -> ComponentTicks {
        ComponentTicks {
            added: self.added_ticks[row].read(),
            changed: self.changed_ticks[row].read(),
        }
    }

    /// # Safety
    /// `row < len`; requires proven write access to the column.
    #[inline]
    pub unsafe fn set_changed(&self, row: usize, change_tick: Tick) {
        self.changed_ticks[row].set(change_tick);
    }

    /// The `(added, changed)` tick cells for `row`.
    #[inline]
    pub fn tick_cells(&self, row: usize) -> (&TickCell, &TickCell) {
        (&self.added_ticks[row], &self.changed_ticks[row])
    }

    /// Removes the value at `row` without dropping it, returning the value
    /// pointer and its ticks. The pointer is valid until the next mutation.
    ///
    /// # Safety
    /// `row < len`.
    pub unsafe fn swap_remove_and_forget(&mut self, row: usize) -> (*mut u8, ComponentTicks) {
        let data = self.data.swap_remove_and_forget(row);
        let added = self.added_ticks.swap_remove(row).into_inner();
        let changed = self.changed_ticks.swap_remove(row).into_inner();
        (data, ComponentTicks { added, changed })
    }

    /// # Safety
    /// `row < len`.
    pub unsafe fn swap_remove_and_drop(&mut self, row: usize) {
        self.data.swap_remove_and_drop(row);
        self.added_ticks.swap_remove(row);
        self.changed_ticks.swap_remove(row);
    }

    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for tick in &mut self.added_ticks {
            tick.get_mut().check_tick(change_tick);
        }
        for tick in &mut self.changed_ticks {
            tick.get_mut().check_tick(change_tick);
        }
    }
}

/// The result of moving an entity's row into another table.
pub struct TableMoveResult {
    pub new_row: usize,
    /// The entity that was swapped into the vacated source row, if any.
    pub swapped_entity: Option<Entity>,
}

/// One archetype's dense storage: a set of columns that move in lock-step.
///
/// Invariant: every column's length equals `entities.len()`.
#[derive(Default)]
pub struct Table {
    columns: FxHashMap<ComponentId, Column>,
    entities: Vec<Entity>,
}

impl Table {
    pub(crate) fn with_columns<'a>(infos: impl Iterator<Item = &'a ComponentInfo>) -> Self {
        let mut table = Self::default();
        for info in infos {
            table.columns.insert(info.id(), Column::new(info));
        }
        table
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[inline]
    pub fn has_column(&self, component_id: ComponentId) -> bool {
        self.columns.contains_key(&component_id)
    }

    #[inline]
    pub fn get_column(&self, component_id: ComponentId) -> Option<&Column> {
        self.columns.get(&component_id)
    }

    #[inline]
    pub fn get_column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.columns.get_mut(&component_id)
    }

    /// Allocates a row for `entity` with uninitialized columns. Callers must
    /// fill every column before the table is observed.
    pub(crate) fn allocate(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        row
    }

    /// Swap-removes `row`, dropping its values. Returns the entity that was
    /// moved into `row`, or `None` when the last row was removed.
    pub fn swap_remove(&mut self, row: usize) -> Option<Entity> {
        debug_assert!(row < self.entities.len());
        for column in self.columns.values_mut() {
            // SAFETY: row bounds asserted above; columns move in lock-step.
            unsafe { column.swap_remove_and_drop(row) };
        }
        let is_last = row == self.entities.len() - 1;
        self.entities.swap_remove(row);
        (!is_last).then(|| self.entities[row])
    }

    /// Moves the entity at `row` into `target`. Columns present in both
    /// tables transfer value and ticks; source-only columns are dropped;
    /// target-only columns are left for the caller to initialize.
    pub fn move_to(&mut self, row: usize, target: &mut Table) -> TableMoveResult {
        debug_assert!(row < self.entities.len());
        let entity = self.entities[row];
        let new_row = target.allocate(entity);
        for (component_id, column) in self.columns.iter_mut() {
            // SAFETY: row is in bounds; the forgotten value is immediately
            // pushed into the target column or dropped below.
            unsafe {
                let (value, ticks) = column.swap_remove_and_forget(row);
                if let Some(target_column) = target.columns.get_mut(component_id) {
                    target_column.push(value, ticks);
                } else if let Some(drop) = column.data_drop() {
                    drop(value);
                }
            }
        }
        let is_last = row == self.entities.len() - 1;
        self.entities.swap_remove(row);
        TableMoveResult {
            new_row,
            swapped_entity: (!is_last).then(|| self.entities[row]),
        }
    }

    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for column in self.columns.values_mut() {
            column.check_change_ticks(change_tick);
        }
    }
}

impl Column {
    fn data_drop(&self) -> Option<unsafe fn(*mut u8)> {
        self.data.drop_fn()
    }
}

/// The collection of all tables, memoizing component-set -> table lookups.
/// Table 0 is always the empty table.
pub struct Tables {
    tables: Vec<Table>,
    table_ids: FxHashMap<Vec<ComponentId>, TableId>,
}

impl Default for Tables {
    fn default() -> Self {
        let mut table_ids = FxHashMap::default();
        table_ids.insert(Vec::new(), TableId::EMPTY);
        Self {
            tables: vec![Table::default()],
            table_ids,
        }
    }
}

impl Tables {
    /// Returns the id of the table backing the archetype with exactly
    /// `archetype_components` (sorted), creating it if needed. Only
    /// `table_components` receive columns; sparse-set components live
    /// elsewhere but still key the table so archetype and table rows stay in
    /// lock-step.
    pub(crate) fn get_id_or_insert<'a>(
        &mut self,
        archetype_components: &[ComponentId],
        table_components: &[ComponentId],
        infos: impl Fn(ComponentId) -> &'a ComponentInfo,
    ) -> TableId {
        debug_assert!(archetype_components.windows(2).all(|w| w[0] < w[1]));
        if let Some(&id) = self.table_ids.get(archetype_components) {
            return id;
        }
        let id = TableId::new(self.tables.len());
        self.tables.push(Table::with_columns(
            table_components.iter().map(|&id| infos(id)),
        ));
        self.table_ids.insert(archetype_components.to_vec(), id);
        id
    }

    #[inline]
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.index())
    }

    /// Borrows two distinct tables mutably.
    pub(crate) fn get_2_mut(&mut self, a: TableId, b: TableId) -> (&mut Table, &mut Table) {
        assert_ne!(a, b);
        if a.index() < b.index() {
            let (lo, hi) = self.tables.split_at_mut(b.index());
            (&mut lo[a.index()], &mut hi[0])
        } else {
            let (lo, hi) = self.tables.split_at_mut(a.index());
            (&mut hi[0], &mut lo[b.index()])
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        for table in &mut self.tables {
            table.check_change_ticks(change_tick);
        }
    }
}

impl Default for TableId {
    fn default() -> Self {
        Self::INVALID
    }
}
