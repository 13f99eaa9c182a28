use std::marker::PhantomData;

use crate::world::World;

/// A cell granting disciplined shared access to a [`World`] from multiple
/// concurrently running systems.
///
/// The dispatcher proves, before admitting a system, that its access set is
/// compatible with every running system's; under that discipline handing each
/// system a copy of this cell is sound. All mutation performed through the
/// cell goes through raw storage pointers or per-resource locks, never
/// through `&mut World`.
#[derive(Clone, Copy)]
pub struct UnsafeWorldCell<'w> {
    world: *mut World,
    _marker: PhantomData<&'w World>,
}

// SAFETY: the cell only permits access patterns whose disjointness was
// proven by the dispatcher; `World` itself is Send + Sync.
unsafe impl Send for UnsafeWorldCell<'_> {}
unsafe impl Sync for UnsafeWorldCell<'_> {}

impl<'w> UnsafeWorldCell<'w> {
    /// Creates a cell that only hands out shared references.
    #[inline]
    pub fn new_readonly(world: &'w World) -> Self {
        Self {
            world: world as *const World as *mut World,
            _marker: PhantomData,
        }
    }

    /// Creates a cell from exclusive access. The caller may later recover
    /// `&mut World` through [`world_mut`](Self::world_mut).
    #[inline]
    pub fn new_mutable(world: &'w mut World) -> Self {
        Self {
            world,
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// The caller's declared access must cover every read performed through
    /// the returned reference, and no incompatible writer may run
    /// concurrently.
    #[inline]
    pub unsafe fn world(self) -> &'w World {
        &*self.world
    }

    /// # Safety
    /// Only valid for cells created with [`new_mutable`](Self::new_mutable),
    /// and only while no other reference derived from this cell is live.
    #[inline]
    pub unsafe fn world_mut(self) -> &'w mut World {
        &mut *self.world
    }
}
