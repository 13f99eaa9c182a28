use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use uuid::Uuid;

use crate::{index::AssetIndex, Asset};

/// Identifies an asset of type `A`: either a runtime generational index or a
/// stable UUID from the side-lane.
pub enum AssetId<A: Asset> {
    Index {
        index: AssetIndex,
        marker: PhantomData<fn() -> A>,
    },
    Uuid {
        uuid: Uuid,
    },
}

impl<A: Asset> AssetId<A> {
    pub(crate) fn internal(self) -> InternalAssetId {
        match self {
            AssetId::Index { index, .. } => InternalAssetId::Index(index),
            AssetId::Uuid { uuid } => InternalAssetId::Uuid(uuid),
        }
    }

    pub fn untyped(self) -> UntypedAssetId {
        UntypedAssetId {
            id: self.internal(),
            type_id: TypeId::of::<A>(),
        }
    }
}

impl<A: Asset> Copy for AssetId<A> {}
impl<A: Asset> Clone for AssetId<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Asset> PartialEq for AssetId<A> {
    fn eq(&self, other: &Self) -> bool {
        self.internal() == other.internal()
    }
}
impl<A: Asset> Eq for AssetId<A> {}

impl<A: Asset> Hash for AssetId<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.internal().hash(state);
    }
}

impl<A: Asset> fmt::Debug for AssetId<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<A>();
        let short = name.rsplit("::").next().unwrap_or(name);
        match self {
            AssetId::Index { index, .. } => write!(
                f,
                "AssetId::<{short}>(index: {}, generation: {})",
                index.index(),
                index.generation()
            ),
            AssetId::Uuid { uuid } => write!(f, "AssetId::<{short}>(uuid: {uuid})"),
        }
    }
}

impl<A: Asset> From<AssetIndex> for AssetId<A> {
    fn from(index: AssetIndex) -> Self {
        AssetId::Index {
            index,
            marker: PhantomData,
        }
    }
}

impl<A: Asset> From<Uuid> for AssetId<A> {
    fn from(uuid: Uuid) -> Self {
        AssetId::Uuid { uuid }
    }
}

/// The untyped payload of an asset id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InternalAssetId {
    Index(AssetIndex),
    Uuid(Uuid),
}

impl InternalAssetId {
    pub(crate) fn untyped(self, type_id: TypeId) -> UntypedAssetId {
        UntypedAssetId { id: self, type_id }
    }
}

/// An asset id carrying its asset type at runtime, so ids of different asset
/// types can be stored and compared together.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UntypedAssetId {
    id: InternalAssetId,
    type_id: TypeId,
}

impl UntypedAssetId {
    #[inline]
    pub fn internal(self) -> InternalAssetId {
        self.id
    }

    #[inline]
    pub fn type_id(self) -> TypeId {
        self.type_id
    }

    /// Converts to a typed id without checking the asset type.
    pub fn typed_unchecked<A: Asset>(self) -> AssetId<A> {
        match self.id {
            InternalAssetId::Index(index) => AssetId::from(index),
            InternalAssetId::Uuid(uuid) => AssetId::from(uuid),
        }
    }

    /// Converts to a typed id, panicking on asset type mismatch.
    pub fn typed<A: Asset>(self) -> AssetId<A> {
        assert_eq!(
            self.type_id,
            TypeId::of::<A>(),
            "attempted to convert an UntypedAssetId of another asset type to {}",
            std::any::type_name::<A>(),
        );
        self.typed_unchecked()
    }
}
