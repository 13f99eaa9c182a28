use fixedbitset::FixedBitSet;

use crate::component::ComponentId;

fn is_subset(lhs: &FixedBitSet, rhs: &FixedBitSet) -> bool {
    lhs.ones().all(|i| rhs.contains(i))
}

fn is_disjoint(lhs: &FixedBitSet, rhs: &FixedBitSet) -> bool {
    lhs.ones().all(|i| !rhs.contains(i))
}

fn inverted_intersect(target: &mut FixedBitSet, other: &FixedBitSet) {
    // target := !target ∩ other, expressed on the finite prefix both sets
    // cover.
    let len = target.len().max(other.len());
    target.grow(len);
    target.toggle_range(..);
    target.intersect_with(other);
}

/// What a system or query may touch: component read/write sets plus resource
/// read/write sets, with "inverted" interpretations for accesses expressed as
/// "everything except ..." and all-resource bits for exclusive-style params.
///
/// Bits index [`ComponentId`]s (components and resources share one id space).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Access {
    /// Components read or written (or, inverted: NOT read or written).
    component_read_and_writes: FixedBitSet,
    /// Components written (or, inverted: NOT written).
    component_writes: FixedBitSet,
    resource_read_and_writes: FixedBitSet,
    resource_writes: FixedBitSet,
    component_read_and_writes_inverted: bool,
    component_writes_inverted: bool,
    reads_all_resources: bool,
    writes_all_resources: bool,
}

impl Access {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component_read(&mut self, id: ComponentId) {
        debug_assert!(!self.component_read_and_writes_inverted);
        self.component_read_and_writes.grow_and_insert(id.index());
    }

    pub fn add_component_write(&mut self, id: ComponentId) {
        debug_assert!(!self.component_writes_inverted);
        self.component_read_and_writes.grow_and_insert(id.index());
        self.component_writes.grow_and_insert(id.index());
    }

    pub fn add_resource_read(&mut self, id: ComponentId) {
        self.resource_read_and_writes.grow_and_insert(id.index());
    }

    pub fn add_resource_write(&mut self, id: ComponentId) {
        self.resource_read_and_writes.grow_and_insert(id.index());
        self.resource_writes.grow_and_insert(id.index());
    }

    /// Declares read access to every component: the inverted empty write set.
    pub fn read_all_components(&mut self) {
        self.component_read_and_writes_inverted = true;
        self.component_read_and_writes.clear();
    }

    /// Declares write access to every component.
    pub fn write_all_components(&mut self) {
        self.read_all_components();
        self.component_writes_inverted = true;
        self.component_writes.clear();
    }

    pub fn read_all_resources(&mut self) {
        self.reads_all_resources = true;
    }

    pub fn write_all_resources(&mut self) {
        self.reads_all_resources = true;
        self.writes_all_resources = true;
    }

    /// Declares everything: what exclusive (`&mut World`) systems carry.
    pub fn read_write_all(&mut self) {
        self.write_all_components();
        self.write_all_resources();
    }

    pub fn has_any_component_write(&self) -> bool {
        self.component_writes_inverted || !self.component_writes.is_clear()
    }

    /// Whether this access reads (or writes) the component.
    pub fn has_component_read(&self, id: ComponentId) -> bool {
        self.component_read_and_writes_inverted
            != self.component_read_and_writes.contains(id.index())
    }

    /// Whether this access writes the component.
    pub fn has_component_write(&self, id: ComponentId) -> bool {
        self.component_writes_inverted != self.component_writes.contains(id.index())
    }

    pub fn has_resource_read(&self, id: ComponentId) -> bool {
        self.reads_all_resources || self.resource_read_and_writes.contains(id.index())
    }

    pub fn has_resource_write(&self, id: ComponentId) -> bool {
        self.writes_all_resources || self.resource_writes.contains(id.index())
    }

    pub fn has_any_resource_read(&self) -> bool {
        self.reads_all_resources || !self.resource_read_and_writes.is_clear()
    }

    pub fn has_any_resource_write(&self) -> bool {
        self.writes_all_resources || !self.resource_writes.is_clear()
    }

    pub fn merge(&mut self, other: &Access) {
        let rw_inverted = self.component_read_and_writes_inverted
            || other.component_read_and_writes_inverted;
        let w_inverted = self.component_writes_inverted || other.component_writes_inverted;

        match (
            self.component_read_and_writes_inverted,
            other.component_read_and_writes_inverted,
        ) {
            (true, true) => self
                .component_read_and_writes
                .intersect_with(&other.component_read_and_writes),
            (true, false) => self
                .component_read_and_writes
                .difference_with(&other.component_read_and_writes),
            (false, true) => inverted_intersect(
                &mut self.component_read_and_writes,
                &other.component_read_and_writes,
            ),
            (false, false) => self
                .component_read_and_writes
                .union_with(&other.component_read_and_writes),
        }
        match (
            self.component_writes_inverted,
            other.component_writes_inverted,
        ) {
            (true, true) => self
                .component_writes
                .intersect_with(&other.component_writes),
            (true, false) => self
                .component_writes
                .difference_with(&other.component_writes),
            (false, true) => {
                inverted_intersect(&mut self.component_writes, &other.component_writes);
            }
            (false, false) => self.component_writes.union_with(&other.component_writes),
        }

        self.reads_all_resources |= other.reads_all_resources;
        self.writes_all_resources |= other.writes_all_resources;
        self.component_read_and_writes_inverted = rw_inverted;
        self.component_writes_inverted = w_inverted;
        self.resource_read_and_writes
            .union_with(&other.resource_read_and_writes);
        self.resource_writes.union_with(&other.resource_writes);
    }

    pub fn is_components_compatible(&self, other: &Access) -> bool {
        let checks = [
            (
                &self.component_writes,
                &other.component_read_and_writes,
                self.component_writes_inverted,
                other.component_read_and_writes_inverted,
            ),
            (
                &other.component_writes,
                &self.component_read_and_writes,
                other.component_writes_inverted,
                self.component_read_and_writes_inverted,
            ),
        ];
        for (writes, reads_writes, writes_inverted, reads_writes_inverted) in checks {
            match (writes_inverted, reads_writes_inverted) {
                (true, true) => return false,
                (true, false) => {
                    if !is_subset(reads_writes, writes) {
                        return false;
                    }
                }
                (false, true) => {
                    if !is_subset(writes, reads_writes) {
                        return false;
                    }
                }
                (false, false) => {
                    if !is_disjoint(writes, reads_writes) {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn is_resources_compatible(&self, other: &Access) -> bool {
        if self.writes_all_resources {
            return !other.has_any_resource_read();
        }
        if other.writes_all_resources {
            return !self.has_any_resource_read();
        }
        if self.reads_all_resources {
            return !other.has_any_resource_write();
        }
        if other.reads_all_resources {
            return !self.has_any_resource_write();
        }
        is_disjoint(&self.resource_writes, &other.resource_read_and_writes)
            && is_disjoint(&other.resource_writes, &self.resource_read_and_writes)
    }

    /// Whether the two accesses may run concurrently.
    pub fn is_compatible(&self, other: &Access) -> bool {
        self.is_components_compatible(other) && self.is_resources_compatible(other)
    }

    /// The ids both sides contend on, for diagnostics.
    pub fn get_conflicts(&self, other: &Access) -> AccessConflicts {
        let mut conflicts = FixedBitSet::new();
        let checks = [
            (
                &self.component_writes,
                &other.component_read_and_writes,
                self.component_writes_inverted,
                other.component_read_and_writes_inverted,
            ),
            (
                &other.component_writes,
                &self.component_read_and_writes,
                other.component_writes_inverted,
                self.component_read_and_writes_inverted,
            ),
        ];
        for (writes, reads_writes, writes_inverted, reads_writes_inverted) in checks {
            match (writes_inverted, reads_writes_inverted) {
                (true, true) => return AccessConflicts::All,
                (true, false) => {
                    let mut diff = reads_writes.clone();
                    diff.difference_with(writes);
                    conflicts.union_with(&diff);
                }
                (false, true) => {
                    let mut diff = writes.clone();
                    diff.difference_with(reads_writes);
                    conflicts.union_with(&diff);
                }
                (false, false) => {
                    let mut inter = writes.clone();
                    inter.intersect_with(reads_writes);
                    conflicts.union_with(&inter);
                }
            }
        }
        if (self.writes_all_resources && other.has_any_resource_read())
            || (other.writes_all_resources && self.has_any_resource_read())
            || (self.reads_all_resources && other.has_any_resource_write())
            || (other.reads_all_resources && self.has_any_resource_write())
        {
            if (self.writes_all_resources || self.reads_all_resources)
                && (other.writes_all_resources || other.reads_all_resources)
            {
                return AccessConflicts::All;
            }
            conflicts.union_with(&self.resource_read_and_writes);
            conflicts.union_with(&other.resource_read_and_writes);
        }
        let mut res = self.resource_writes.clone();
        res.intersect_with(&other.resource_read_and_writes);
        conflicts.union_with(&res);
        let mut res = other.resource_writes.clone();
        res.intersect_with(&self.resource_read_and_writes);
        conflicts.union_with(&res);
        AccessConflicts::Individual(conflicts)
    }
}

/// The contended ids reported by [`Access::get_conflicts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessConflicts {
    /// Conflict on an unbounded set (an inverted or all-resources access).
    All,
    Individual(FixedBitSet),
}

impl AccessConflicts {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All => false,
            Self::Individual(set) => set.is_clear(),
        }
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        match self {
            Self::All => Vec::new(),
            Self::Individual(set) => set.ones().map(ComponentId::new).collect(),
        }
    }
}

/// The `With`/`Without` constraint sets attached to one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFilters {
    pub with: FixedBitSet,
    pub without: FixedBitSet,
}

impl AccessFilters {
    /// Two filter sets rule each other out when one requires a component the
    /// other forbids: such queries can never match the same archetype.
    pub fn is_ruled_out_by(&self, other: &Self) -> bool {
        !is_disjoint(&self.with, &other.without) || !is_disjoint(&self.without, &other.with)
    }
}

/// An [`Access`] together with its filter constraints. Queries whose write
/// sets overlap are still compatible when every pair of their filter sets is
/// mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredAccess {
    access: Access,
    required: FixedBitSet,
    filter_sets: Vec<AccessFilters>,
}

impl FilteredAccess {
    pub fn matches_everything() -> Self {
        Self {
            access: Access::default(),
            required: FixedBitSet::new(),
            filter_sets: vec![AccessFilters::default()],
        }
    }

    #[inline]
    pub fn access(&self) -> &Access {
        &self.access
    }

    #[inline]
    pub fn access_mut(&mut self) -> &mut Access {
        &mut self.access
    }

    pub fn add_component_read(&mut self, id: ComponentId) {
        self.access.add_component_read(id);
        self.add_required(id);
        self.and_with(id);
    }

    pub fn add_component_write(&mut self, id: ComponentId) {
        self.access.add_component_write(id);
        self.add_required(id);
        self.and_with(id);
    }

    fn add_required(&mut self, id: ComponentId) {
        self.required.grow_and_insert(id.index());
    }

    /// Adds a `With<T>` constraint to every filter set.
    pub fn and_with(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            filter.with.grow_and_insert(id.index());
        }
    }

    /// Adds a `Without<T>` constraint to every filter set.
    pub fn and_without(&mut self, id: ComponentId) {
        for filter in &mut self.filter_sets {
            filter.without.grow_and_insert(id.index());
        }
    }

    pub fn is_compatible(&self, other: &FilteredAccess) -> bool {
        if !self.access.is_resources_compatible(&other.access) {
            return false;
        }
        if self.access.is_components_compatible(&other.access) {
            return true;
        }
        self.filter_sets.iter().all(|lhs| {
            other
                .filter_sets
                .iter()
                .all(|rhs| lhs.is_ruled_out_by(rhs))
        })
    }

    pub fn get_conflicts(&self, other: &FilteredAccess) -> AccessConflicts {
        if self.is_compatible(other) {
            AccessConflicts::Individual(FixedBitSet::new())
        } else {
            self.access.get_conflicts(&other.access)
        }
    }

    /// Combines another access into this one, keeping only the filter-set
    /// combinations that are satisfiable.
    pub fn merge(&mut self, other: &FilteredAccess) {
        self.access.merge(&other.access);
        self.required.union_with(&other.required);
        let old_filters = std::mem::take(&mut self.filter_sets);
        for lhs in &old_filters {
            for rhs in &other.filter_sets {
                if !lhs.is_ruled_out_by(rhs) {
                    let mut combined = lhs.clone();
                    combined.with.union_with(&rhs.with);
                    combined.without.union_with(&rhs.without);
                    self.filter_sets.push(combined);
                }
            }
        }
    }

    pub fn with_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.filter_sets
            .first()
            .into_iter()
            .flat_map(|f| f.with.ones().map(ComponentId::new))
    }

    pub fn without_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.filter_sets
            .first()
            .into_iter()
            .flat_map(|f| f.without.ones().map(ComponentId::new))
    }
}

/// The full access declaration of a system: one [`FilteredAccess`] per
/// parameter, plus their combination for the fast compatibility path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredAccessSet {
    combined_access: Access,
    filtered_accesses: Vec<FilteredAccess>,
}

impl FilteredAccessSet {
    #[inline]
    pub fn combined_access(&self) -> &Access {
        &self.combined_access
    }

    pub fn add(&mut self, filtered: FilteredAccess) {
        self.combined_access.merge(filtered.access());
        self.filtered_accesses.push(filtered);
    }

    pub fn add_unfiltered_resource_read(&mut self, id: ComponentId) {
        let mut filtered = FilteredAccess::matches_everything();
        filtered.access_mut().add_resource_read(id);
        self.add(filtered);
    }

    pub fn add_unfiltered_resource_write(&mut self, id: ComponentId) {
        let mut filtered = FilteredAccess::matches_everything();
        filtered.access_mut().add_resource_write(id);
        self.add(filtered);
    }

    pub fn add_unfiltered_read_all(&mut self) {
        let mut filtered = FilteredAccess::matches_everything();
        filtered.access_mut().read_all_components();
        filtered.access_mut().read_all_resources();
        self.add(filtered);
    }

    pub fn add_unfiltered_write_all(&mut self) {
        let mut filtered = FilteredAccess::matches_everything();
        filtered.access_mut().read_write_all();
        self.add(filtered);
    }

    pub fn extend(&mut self, other: &FilteredAccessSet) {
        self.combined_access.merge(&other.combined_access);
        self.filtered_accesses
            .extend(other.filtered_accesses.iter().cloned());
    }

    pub fn is_compatible(&self, other: &FilteredAccessSet) -> bool {
        if self.combined_access.is_compatible(&other.combined_access) {
            return true;
        }
        for lhs in &self.filtered_accesses {
            for rhs in &other.filtered_accesses {
                if !lhs.is_compatible(rhs) {
                    return false;
                }
            }
        }
        true
    }

    pub fn get_conflicts(&self, other: &FilteredAccessSet) -> AccessConflicts {
        let mut all = FixedBitSet::new();
        if !self.combined_access.is_compatible(&other.combined_access) {
            for lhs in &self.filtered_accesses {
                for rhs in &other.filtered_accesses {
                    match lhs.get_conflicts(rhs) {
                        AccessConflicts::All => return AccessConflicts::All,
                        AccessConflicts::Individual(set) => all.union_with(&set),
                    }
                }
            }
        }
        AccessConflicts::Individual(all)
    }

    /// Conflicts between this set and one additional access.
    pub fn get_conflicts_single(&self, other: &FilteredAccess) -> AccessConflicts {
        let mut all = FixedBitSet::new();
        if !self.combined_access.is_compatible(other.access()) {
            for lhs in &self.filtered_accesses {
                match lhs.get_conflicts(other) {
                    AccessConflicts::All => return AccessConflicts::All,
                    AccessConflicts::Individual(set) => all.union_with(&set),
                }
            }
        }
        AccessConflicts::Individual(all)
    }

    pub fn filtered_accesses(&self) -> &[FilteredAccess] {
        &self.filtered_accesses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ComponentId {
        ComponentId::new(n)
    }

    #[test]
    fn read_read_is_compatible() {
        let mut a = Access::new();
        a.add_component_read(id(0));
        let mut b = Access::new();
        b.add_component_read(id(0));
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn write_overlap_conflicts() {
        let mut a = Access::new();
        a.add_component_write(id(0));
        let mut b = Access::new();
        b.add_component_read(id(0));
        assert!(!a.is_compatible(&b));
        assert_eq!(a.get_conflicts(&b).ids(), vec![id(0)]);
    }

    #[test]
    fn disjoint_writes_are_compatible() {
        let mut a = Access::new();
        a.add_component_write(id(0));
        let mut b = Access::new();
        b.add_component_write(id(1));
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn write_all_components_conflicts_with_any_read() {
        let mut a = Access::new();
        a.write_all_components();
        let mut b = Access::new();
        b.add_component_read(id(9));
        assert!(!a.is_compatible(&b));
    }

    #[test]
    fn all_resource_bits() {
        let mut a = Access::new();
        a.write_all_resources();
        let mut read = Access::new();
        read.add_resource_read(id(2));
        assert!(!a.is_compatible(&read));

        let mut r = Access::new();
        r.read_all_resources();
        let mut w = Access::new();
        w.add_resource_write(id(2));
        assert!(!r.is_compatible(&w));
        let mut ro = Access::new();
        ro.add_resource_read(id(2));
        assert!(r.is_compatible(&ro));
    }

    #[test]
    fn resource_and_component_spaces_do_not_collide() {
        // Same bit index used as a component write and a resource read must
        // not conflict: they live in different set families.
        let mut a = Access::new();
        a.add_component_write(id(4));
        let mut b = Access::new();
        b.add_resource_read(id(4));
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn disjoint_filters_reconcile_conflicting_writes() {
        // Query<&mut T, With<X>> vs Query<&mut T, Without<X>>.
        let mut lhs = FilteredAccess::matches_everything();
        lhs.add_component_write(id(0));
        lhs.and_with(id(1));
        let mut rhs = FilteredAccess::matches_everything();
        rhs.add_component_write(id(0));
        rhs.and_without(id(1));
        assert!(lhs.is_compatible(&rhs));

        // Without the disambiguating filter they conflict.
        let mut naked = FilteredAccess::matches_everything();
        naked.add_component_write(id(0));
        assert!(!lhs.is_compatible(&naked));
    }

    #[test]
    fn merge_unions_accesses() {
        let mut a = Access::new();
        a.add_component_read(id(0));
        let mut b = Access::new();
        b.add_component_write(id(1));
        a.merge(&b);
        let mut probe = Access::new();
        probe.add_component_write(id(1));
        assert!(!a.is_compatible(&probe));
    }

    #[test]
    fn filtered_access_set_combination() {
        let mut set_a = FilteredAccessSet::default();
        set_a.add_unfiltered_resource_write(id(3));
        let mut set_b = FilteredAccessSet::default();
        set_b.add_unfiltered_resource_read(id(3));
        assert!(!set_a.is_compatible(&set_b));
        let mut set_c = FilteredAccessSet::default();
        set_c.add_unfiltered_resource_read(id(4));
        assert!(set_a.is_compatible(&set_c));
    }
}
