use std::fmt;

use crate::{id::AssetId, Asset};

/// Lifecycle events for assets of type `A`, published on the app event
/// channel at the end of each frame.
pub enum AssetEvent<A: Asset> {
    /// A value was stored in a previously empty slot.
    Added { id: AssetId<A> },
    /// A stored value was mutably accessed or replaced.
    Modified { id: AssetId<A> },
    /// A value was removed (forced removal or final handle drop).
    Removed { id: AssetId<A> },
    /// The last strong handle for the id dropped; the slot was released.
    Unused { id: AssetId<A> },
    /// A background load (and its dependencies) finished and the value is
    /// available.
    LoadedWithDependencies { id: AssetId<A> },
}

impl<A: Asset> AssetEvent<A> {
    pub fn is_added(&self, asset_id: impl Into<AssetId<A>>) -> bool {
        matches!(self, Self::Added { id } if *id == asset_id.into())
    }

    pub fn is_modified(&self, asset_id: impl Into<AssetId<A>>) -> bool {
        matches!(self, Self::Modified { id } if *id == asset_id.into())
    }

    pub fn is_removed(&self, asset_id: impl Into<AssetId<A>>) -> bool {
        matches!(self, Self::Removed { id } if *id == asset_id.into())
    }

    pub fn is_unused(&self, asset_id: impl Into<AssetId<A>>) -> bool {
        matches!(self, Self::Unused { id } if *id == asset_id.into())
    }

    pub fn is_loaded_with_dependencies(&self, asset_id: impl Into<AssetId<A>>) -> bool {
        matches!(self, Self::LoadedWithDependencies { id } if *id == asset_id.into())
    }
}

impl<A: Asset> Clone for AssetEvent<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Asset> Copy for AssetEvent<A> {}

impl<A: Asset> PartialEq for AssetEvent<A> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Added { id: a }, Self::Added { id: b })
            | (Self::Modified { id: a }, Self::Modified { id: b })
            | (Self::Removed { id: a }, Self::Removed { id: b })
            | (Self::Unused { id: a }, Self::Unused { id: b })
            | (
                Self::LoadedWithDependencies { id: a },
                Self::LoadedWithDependencies { id: b },
            ) => a == b,
            _ => false,
        }
    }
}

impl<A: Asset> Eq for AssetEvent<A> {}

impl<A: Asset> fmt::Debug for AssetEvent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { id } => f.debug_struct("Added").field("id", id).finish(),
            Self::Modified { id } => f.debug_struct("Modified").field("id", id).finish(),
            Self::Removed { id } => f.debug_struct("Removed").field("id", id).finish(),
            Self::Unused { id } => f.debug_struct("Unused").field("id", id).finish(),
            Self::LoadedWithDependencies { id } => f
                .debug_struct("LoadedWithDependencies")
                .field("id", id)
                .finish(),
        }
    }
}
