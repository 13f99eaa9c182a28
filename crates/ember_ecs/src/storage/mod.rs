//! Component storage: archetype tables for `Table`-class components and
//! sparse sets for `SparseSet`-class components.

mod blob_vec;
mod sparse_set;
mod table;

pub use blob_vec::BlobVec;
pub use sparse_set::{ComponentSparseSet, SparseSets};
pub use table::{Column, Table, TableId, TableMoveResult, Tables};

use crate::tick::Tick;

/// The raw storage owned by a world.
#[derive(Default)]
pub struct Storages {
    pub tables: Tables,
    pub sparse_sets: SparseSets,
}

impl Storages {
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        self.tables.check_change_ticks(change_tick);
        self.sparse_sets.check_change_ticks(change_tick);
    }
}
