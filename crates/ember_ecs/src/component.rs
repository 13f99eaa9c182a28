use std::{
    alloc::Layout,
    any::{type_name, TypeId},
    borrow::Cow,
};

use fxhash::FxHashMap;
use parking_lot::RwLock;

/// A compact, registry-assigned identifier for a component or resource type.
///
/// Unlike [`TypeId`], these ids are dense `u32`s handed out in registration
/// order, which makes them usable as bitset indices in access sets and as
/// keys in archetype edges.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a component's values live.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub enum StorageType {
    /// Densely packed in archetype tables. Fast to iterate, slower to
    /// add/remove because the entity changes archetype.
    #[default]
    Table,
    /// Keyed by entity index in a sparse set. O(1) add/remove without an
    /// archetype move.
    SparseSet,
}

/// Marker trait for component types.
pub trait Component: Send + Sync + 'static {
    const STORAGE_TYPE: StorageType = StorageType::Table;
}

/// Marker trait for resource types (process-wide singletons keyed by type).
pub trait Resource: Send + Sync + 'static {}

/// The erased description of a registered type: everything storage needs to
/// allocate, relocate and destroy values without knowing the Rust type.
pub struct ComponentDescriptor {
    name: Cow<'static, str>,
    type_id: Option<TypeId>,
    layout: Layout,
    // SAFETY: must only ever be called with a pointer to a live value of the
    // described type.
    drop: Option<unsafe fn(*mut u8)>,
    storage_type: StorageType,
}

impl ComponentDescriptor {
    pub fn new<T: Send + Sync + 'static>(storage_type: StorageType) -> Self {
        Self {
            name: Cow::Borrowed(type_name::<T>()),
            type_id: Some(TypeId::of::<T>()),
            layout: Layout::new::<T>(),
            drop: std::mem::needs_drop::<T>().then_some(Self::drop_ptr::<T> as _),
            storage_type,
        }
    }

    /// # Safety
    /// `ptr` must point to a live, aligned value of type `T`.
    unsafe fn drop_ptr<T>(ptr: *mut u8) {
        ptr.cast::<T>().drop_in_place();
    }
}

/// A registered type's stable metadata. References handed out by
/// [`TypeRegistry::info`] remain valid for the registry's lifetime.
pub struct ComponentInfo {
    id: ComponentId,
    descriptor: ComponentDescriptor,
}

impl ComponentInfo {
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.descriptor.type_id
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.descriptor.layout
    }

    #[inline]
    pub fn drop(&self) -> Option<unsafe fn(*mut u8)> {
        self.descriptor.drop
    }

    #[inline]
    pub fn storage_type(&self) -> StorageType {
        self.descriptor.storage_type
    }
}

#[derive(Default)]
struct RegistryIndices {
    components: FxHashMap<TypeId, ComponentId>,
    resources: FxHashMap<TypeId, ComponentId>,
}

/// Assigns dense [`ComponentId`]s to types on first sight and stores their
/// erased descriptors.
///
/// Registration is idempotent and safe to call from multiple threads;
/// descriptors are kept behind stable boxes so `info` lookups can outlive
/// later registrations.
#[derive(Default)]
pub struct TypeRegistry {
    infos: RwLock<Vec<Box<ComponentInfo>>>,
    indices: RwLock<RegistryIndices>,
}

impl TypeRegistry {
    pub fn register_component<T: Component>(&self) -> ComponentId {
        self.register_with(TypeId::of::<T>(), false, || {
            ComponentDescriptor::new::<T>(T::STORAGE_TYPE)
        })
    }

    pub fn register_resource<T: Resource>(&self) -> ComponentId {
        self.register_with(TypeId::of::<T>(), true, || {
            ComponentDescriptor::new::<T>(StorageType::Table)
        })
    }

    /// Registers a type with an explicit descriptor, bypassing the
    /// compile-time defaults. Idempotent per `TypeId`.
    pub fn register_with(
        &self,
        type_id: TypeId,
        resource: bool,
        descriptor: impl FnOnce() -> ComponentDescriptor,
    ) -> ComponentId {
        {
            let indices = self.indices.read();
            let map = if resource {
                &indices.resources
            } else {
                &indices.components
            };
            if let Some(&id) = map.get(&type_id) {
                return id;
            }
        }
        let mut indices = self.indices.write();
        let map = if resource {
            &mut indices.resources
        } else {
            &mut indices.components
        };
        if let Some(&id) = map.get(&type_id) {
            return id;
        }
        let mut infos = self.infos.write();
        let id = ComponentId::new(infos.len());
        infos.push(Box::new(ComponentInfo {
            id,
            descriptor: descriptor(),
        }));
        map.insert(type_id, id);
        id
    }

    pub fn get_component_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.indices.read().components.get(&type_id).copied()
    }

    pub fn get_resource_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.indices.read().resources.get(&type_id).copied()
    }

    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.get_component_id(TypeId::of::<T>())
    }

    pub fn resource_id<T: Resource>(&self) -> Option<ComponentId> {
        self.get_resource_id(TypeId::of::<T>())
    }

    /// Looks up the descriptor for `id`.
    ///
    /// The returned reference is tied to the registry, not to the internal
    /// lock: descriptors are boxed and never dropped while the registry is
    /// alive.
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        let infos = self.infos.read();
        let info = infos.get(id.index())?;
        // SAFETY: the box's pointee is never moved or freed until the
        // registry itself drops; extending the borrow past the lock guard is
        // sound because registration only pushes.
        Some(unsafe { &*(info.as_ref() as *const ComponentInfo) })
    }

    pub fn len(&self) -> usize {
        self.infos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves a name for diagnostics; falls back to the raw id.
    pub fn name(&self, id: ComponentId) -> String {
        self.info(id)
            .map(|info| info.name().to_string())
            .unwrap_or_else(|| format!("<unregistered {:?}>", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    impl Component for Position {}

    struct Frozen;
    impl Component for Frozen {
        const STORAGE_TYPE: StorageType = StorageType::SparseSet;
    }

    struct Score(#[allow(dead_code)] u32);
    impl Resource for Score {}

    #[test]
    fn registration_is_idempotent() {
        let registry = TypeRegistry::default();
        let a = registry.register_component::<Position>();
        let b = registry.register_component::<Position>();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn components_and_resources_have_distinct_ids() {
        let registry = TypeRegistry::default();
        let c = registry.register_component::<Position>();
        let r = registry.register_resource::<Score>();
        assert_ne!(c, r);
        assert_eq!(registry.component_id::<Position>(), Some(c));
        assert_eq!(registry.resource_id::<Score>(), Some(r));
    }

    #[test]
    fn descriptor_records_storage_class() {
        let registry = TypeRegistry::default();
        let id = registry.register_component::<Frozen>();
        let info = registry.info(id).unwrap();
        assert_eq!(info.storage_type(), StorageType::SparseSet);
        assert_eq!(info.layout(), Layout::new::<Frozen>());
    }

    #[test]
    fn concurrent_registration_yields_one_id() {
        let registry = std::sync::Arc::new(TypeRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register_component::<Position>())
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
