use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    id::{AssetId, InternalAssetId, UntypedAssetId},
    index::AssetIndexAllocator,
    Asset,
};

/// Published exactly once when the last clone of a strong handle drops.
pub(crate) struct DropEvent {
    pub(crate) id: InternalAssetId,
    pub(crate) loader_managed: bool,
}

/// Reserves indices and mints strong handles for one asset type.
#[derive(Clone)]
pub struct HandleProvider {
    pub(crate) allocator: Arc<AssetIndexAllocator>,
    pub(crate) drop_sender: Sender<DropEvent>,
    pub(crate) drop_receiver: Receiver<DropEvent>,
    pub(crate) type_id: TypeId,
}

impl HandleProvider {
    pub(crate) fn new(type_id: TypeId, allocator: Arc<AssetIndexAllocator>) -> Self {
        let (drop_sender, drop_receiver) = crossbeam_channel::unbounded();
        Self {
            allocator,
            drop_sender,
            drop_receiver,
            type_id,
        }
    }

    /// Reserves a fresh index wrapped in a strong, caller-owned handle.
    pub fn reserve(&self) -> UntypedHandle {
        UntypedHandle::Strong(self.reserve_internal(false, None))
    }

    pub(crate) fn reserve_internal(
        &self,
        loader_managed: bool,
        path: Option<PathBuf>,
    ) -> Arc<StrongHandle> {
        let index = self.allocator.reserve();
        self.get_handle(InternalAssetId::Index(index), loader_managed, path)
    }

    pub(crate) fn get_handle(
        &self,
        id: InternalAssetId,
        loader_managed: bool,
        path: Option<PathBuf>,
    ) -> Arc<StrongHandle> {
        Arc::new(StrongHandle {
            id: id.untyped(self.type_id),
            drop_sender: self.drop_sender.clone(),
            loader_managed,
            path,
        })
    }
}

/// The shared core of strong handles. Dropping the last clone publishes a
/// destruction event tagged with the id, which the owning `Assets`
/// collection processes on its next `handle_events` pass.
pub struct StrongHandle {
    pub(crate) id: UntypedAssetId,
    pub(crate) drop_sender: Sender<DropEvent>,
    /// Whether this handle's lifetime is managed by the asset server (it was
    /// produced by a `load` call rather than a direct insertion).
    pub(crate) loader_managed: bool,
    pub(crate) path: Option<PathBuf>,
}

impl StrongHandle {
    #[inline]
    pub fn id(&self) -> UntypedAssetId {
        self.id
    }

    #[inline]
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

impl Drop for StrongHandle {
    fn drop(&mut self) {
        let _ = self.drop_sender.send(DropEvent {
            id: self.id.internal(),
            loader_managed: self.loader_managed,
        });
    }
}

impl fmt::Debug for StrongHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrongHandle")
            .field("id", &self.id)
            .field("loader_managed", &self.loader_managed)
            .field("path", &self.path)
            .finish()
    }
}

/// A reference to an asset of type `A`.
///
/// A strong handle keeps the asset alive; dropping the last strong handle
/// releases the slot and invalidates weak handles of earlier generations. A
/// weak handle is just the id.
pub enum Handle<A: Asset> {
    Strong(Arc<StrongHandle>),
    Weak(AssetId<A>),
}

impl<A: Asset> Handle<A> {
    #[inline]
    pub fn id(&self) -> AssetId<A> {
        match self {
            Handle::Strong(strong) => strong.id.typed_unchecked(),
            Handle::Weak(id) => *id,
        }
    }

    #[inline]
    pub fn is_strong(&self) -> bool {
        matches!(self, Handle::Strong(_))
    }

    #[inline]
    pub fn is_weak(&self) -> bool {
        matches!(self, Handle::Weak(_))
    }

    /// A weak clone that does not keep the asset alive.
    #[inline]
    pub fn weak(&self) -> Self {
        Handle::Weak(self.id())
    }

    #[inline]
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Handle::Strong(strong) => strong.path.as_ref(),
            Handle::Weak(_) => None,
        }
    }

    /// Erases the asset type, keeping it available at runtime.
    pub fn untyped(self) -> UntypedHandle {
        match self {
            Handle::Strong(strong) => UntypedHandle::Strong(strong),
            Handle::Weak(id) => UntypedHandle::Weak(id.untyped()),
        }
    }
}

impl<A: Asset> From<&Handle<A>> for AssetId<A> {
    fn from(handle: &Handle<A>) -> Self {
        handle.id()
    }
}

impl<A: Asset> From<Handle<A>> for AssetId<A> {
    fn from(handle: Handle<A>) -> Self {
        handle.id()
    }
}

impl<A: Asset> Clone for Handle<A> {
    fn clone(&self) -> Self {
        match self {
            Handle::Strong(strong) => Handle::Strong(strong.clone()),
            Handle::Weak(id) => Handle::Weak(*id),
        }
    }
}

impl<A: Asset> PartialEq for Handle<A> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl<A: Asset> Eq for Handle<A> {}

impl<A: Asset> Hash for Handle<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl<A: Asset> fmt::Debug for Handle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Strong(strong) => write!(f, "Strong({:?})", strong.id),
            Handle::Weak(id) => write!(f, "Weak({id:?})"),
        }
    }
}

/// A [`Handle`] with the asset type erased.
#[derive(Clone)]
pub enum UntypedHandle {
    Strong(Arc<StrongHandle>),
    Weak(UntypedAssetId),
}

impl UntypedHandle {
    #[inline]
    pub fn id(&self) -> UntypedAssetId {
        match self {
            UntypedHandle::Strong(strong) => strong.id,
            UntypedHandle::Weak(id) => *id,
        }
    }

    #[inline]
    pub fn is_strong(&self) -> bool {
        matches!(self, UntypedHandle::Strong(_))
    }

    #[inline]
    pub fn is_weak(&self) -> bool {
        matches!(self, UntypedHandle::Weak(_))
    }

    #[inline]
    pub fn weak(&self) -> Self {
        UntypedHandle::Weak(self.id())
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.id().type_id()
    }

    /// Converts to a typed handle, panicking on asset type mismatch.
    pub fn typed<A: Asset>(self) -> Handle<A> {
        assert_eq!(
            self.type_id(),
            TypeId::of::<A>(),
            "attempted to convert an UntypedHandle of another asset type to Handle<{}>",
            std::any::type_name::<A>(),
        );
        match self {
            UntypedHandle::Strong(strong) => Handle::Strong(strong),
            UntypedHandle::Weak(id) => Handle::Weak(id.typed_unchecked()),
        }
    }
}

impl PartialEq for UntypedHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for UntypedHandle {}

impl Hash for UntypedHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UntypedHandle::Strong(strong) => write!(f, "Strong({:?})", strong.id),
            UntypedHandle::Weak(id) => write!(f, "Weak({id:?})"),
        }
    }
}
