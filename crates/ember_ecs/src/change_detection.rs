use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};

use crate::tick::{Tick, TickCell};

/// The tick references backing a mutable component borrow.
pub struct TicksMut<'w> {
    pub(crate) added: &'w TickCell,
    pub(crate) changed: &'w TickCell,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

/// A mutable borrow of a component that records modifications in the
/// component's change tick on first write access.
pub struct Mut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

impl<'w, T: ?Sized> Mut<'w, T> {
    /// Whether the component was added since the running system's last run.
    pub fn is_added(&self) -> bool {
        // SAFETY: read access to the slot is implied by the mutable borrow.
        unsafe { self.ticks.added.read() }.is_newer_than(self.ticks.last_run, self.ticks.this_run)
    }

    /// Whether the component was mutated since the running system's last run.
    pub fn is_changed(&self) -> bool {
        // SAFETY: as above.
        unsafe { self.ticks.changed.read() }.is_newer_than(self.ticks.last_run, self.ticks.this_run)
    }

    /// Records a mutation without going through `DerefMut`.
    pub fn set_changed(&mut self) {
        // SAFETY: the mutable borrow proves exclusive access to the slot.
        unsafe { self.ticks.changed.set(self.ticks.this_run) };
    }

    /// Maps to a borrow of a field, keeping change tracking attached.
    pub fn map_unchanged<U: ?Sized>(self, f: impl FnOnce(&mut T) -> &mut U) -> Mut<'w, U> {
        Mut {
            value: f(self.value),
            ticks: self.ticks,
        }
    }

    /// Consumes the wrapper, marking the value changed.
    pub fn into_inner(mut self) -> &'w mut T {
        self.set_changed();
        self.value
    }

    /// Access without flagging a change.
    pub fn bypass_change_detection(&mut self) -> &mut T {
        self.value
    }
}

impl<'w, T: ?Sized> Deref for Mut<'w, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<'w, T: ?Sized> DerefMut for Mut<'w, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.set_changed();
        self.value
    }
}

impl<'w, T: fmt::Debug + ?Sized> fmt::Debug for Mut<'w, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mut").field(&self.value).finish()
    }
}

/// A shared borrow of a resource, held as a read guard on the resource's
/// lock for the duration of the system parameter's lifetime.
pub struct Res<'w, T: ?Sized> {
    pub(crate) value: MappedRwLockReadGuard<'w, T>,
}

impl<'w, T: ?Sized> Deref for Res<'w, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<'w, T: fmt::Debug + ?Sized> fmt::Debug for Res<'w, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Res").field(&&*self.value).finish()
    }
}

/// An exclusive borrow of a resource, held as a write guard on the
/// resource's lock.
pub struct ResMut<'w, T: ?Sized> {
    pub(crate) value: MappedRwLockWriteGuard<'w, T>,
}

impl<'w, T: ?Sized> Deref for ResMut<'w, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<'w, T: ?Sized> DerefMut for ResMut<'w, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<'w, T: fmt::Debug + ?Sized> fmt::Debug for ResMut<'w, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResMut").field(&&*self.value).finish()
    }
}
