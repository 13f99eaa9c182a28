use std::any::{Any, TypeId};
use std::path::Path;

use thiserror::Error;

use crate::Asset;

/// A failure while loading an asset from disk.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("i/o error while loading asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl LoadError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Context handed to loaders; mostly the path being loaded plus IO helpers.
pub struct LoadContext<'a> {
    path: &'a Path,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(path: &'a Path) -> Self {
        Self { path }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        self.path
    }

    /// Reads the asset's file into memory.
    pub fn read_bytes(&self) -> Result<Vec<u8>, LoadError> {
        Ok(std::fs::read(self.path)?)
    }

    /// Reads the asset's file as UTF-8 text.
    pub fn read_string(&self) -> Result<String, LoadError> {
        Ok(std::fs::read_to_string(self.path)?)
    }
}

/// Decodes files with known extensions into assets of one type.
///
/// The core dispatches to loaders purely by file extension and treats the
/// path as opaque; the loader performs its own IO through [`LoadContext`].
pub trait AssetLoader: Send + Sync + 'static {
    type Asset: Asset;

    /// The file extensions (without the dot) this loader handles.
    fn extensions(&self) -> &[&str];

    fn load(&self, path: &Path, context: &mut LoadContext) -> Result<Self::Asset, LoadError>;
}

/// Object-safe form of [`AssetLoader`] used by the server's registry.
pub(crate) trait ErasedAssetLoader: Send + Sync {
    fn extensions(&self) -> &[&str];
    fn asset_type_id(&self) -> TypeId;
    fn load_erased(
        &self,
        path: &Path,
        context: &mut LoadContext,
    ) -> Result<Box<dyn Any + Send + Sync>, LoadError>;
}

impl<L: AssetLoader> ErasedAssetLoader for L {
    fn extensions(&self) -> &[&str] {
        AssetLoader::extensions(self)
    }

    fn asset_type_id(&self) -> TypeId {
        TypeId::of::<L::Asset>()
    }

    fn load_erased(
        &self,
        path: &Path,
        context: &mut LoadContext,
    ) -> Result<Box<dyn Any + Send + Sync>, LoadError> {
        self.load(path, context)
            .map(|asset| Box::new(asset) as Box<dyn Any + Send + Sync>)
    }
}
