use std::any::Any;

use fxhash::FxHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    change_detection::{Res, ResMut},
    component::ComponentId,
};

/// The process-wide singletons of a world, keyed by their registered
/// [`ComponentId`].
///
/// Each value sits behind its own reader/writer lock; mutation requires the
/// exclusive side. The scheduler proves that concurrently running systems
/// never contend on the same resource, so these locks are uncontended in
/// well-formed schedules, but they keep direct world access honest.
#[derive(Default)]
pub struct Resources {
    // Each box holds a `RwLock<T>` for the concrete resource type.
    slots: FxHashMap<ComponentId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn insert<T: Send + Sync + 'static>(&mut self, id: ComponentId, value: T) -> Option<T> {
        let previous = self.remove(id);
        self.slots.insert(id, Box::new(RwLock::new(value)));
        previous
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self, id: ComponentId) -> Option<T> {
        let slot = self.slots.remove(&id)?;
        match slot.downcast::<RwLock<T>>() {
            Ok(lock) => Some(lock.into_inner()),
            Err(slot) => {
                // Type mismatch: put it back rather than lose the value.
                self.slots.insert(id, slot);
                None
            }
        }
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get<T: Send + Sync + 'static>(&self, id: ComponentId) -> Option<Res<'_, T>> {
        let lock = self.slots.get(&id)?.downcast_ref::<RwLock<T>>()?;
        Some(Res {
            value: RwLockReadGuard::map(lock.read(), |v| v),
        })
    }

    pub fn get_mut<T: Send + Sync + 'static>(&self, id: ComponentId) -> Option<ResMut<'_, T>> {
        let lock = self.slots.get(&id)?.downcast_ref::<RwLock<T>>()?;
        Some(ResMut {
            value: RwLockWriteGuard::map(lock.write(), |v| v),
        })
    }

    /// Direct exclusive access, bypassing the lock (we hold `&mut self`).
    pub fn get_exclusive<T: Send + Sync + 'static>(&mut self, id: ComponentId) -> Option<&mut T> {
        let lock = self.slots.get_mut(&id)?.downcast_mut::<RwLock<T>>()?;
        Some(lock.get_mut())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_round_trip() {
        let mut resources = Resources::default();
        let id = ComponentId::new(0);
        assert!(resources.insert(id, 41u32).is_none());
        assert_eq!(*resources.get::<u32>(id).unwrap(), 41);
        *resources.get_mut::<u32>(id).unwrap() += 1;
        assert_eq!(resources.remove::<u32>(id), Some(42));
        assert!(resources.get::<u32>(id).is_none());
    }

    #[test]
    fn concurrent_readers_share_the_lock() {
        let mut resources = Resources::default();
        let id = ComponentId::new(1);
        resources.insert(id, String::from("shared"));
        let a = resources.get::<String>(id).unwrap();
        let b = resources.get::<String>(id).unwrap();
        assert_eq!(&*a, &*b);
    }
}
