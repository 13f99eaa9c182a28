use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crossbeam_channel::{Receiver, Sender};
use ember_ecs::component::Resource;
use ember_ecs::world::World;
use parking_lot::RwLock;
use thiserror::Error;

use crate::{
    assets::Assets,
    handle::{Handle, HandleProvider, StrongHandle},
    id::{InternalAssetId, UntypedAssetId},
    index::AssetIndex,
    loader::{ErasedAssetLoader, LoadContext, LoadError},
    Asset, AssetLoader,
};

/// Failures surfaced by the load pipeline.
#[derive(Error, Debug)]
pub enum AssetServerError {
    #[error("no asset loader registered for extension `{extension}`")]
    MissingLoader { extension: String },
    #[error("asset load failed: {cause}")]
    LoadFailed { cause: LoadError },
}

struct PathInfo {
    /// Weak so the path map never keeps an asset alive by itself; `load`
    /// upgrades it to deduplicate concurrent requests.
    handle: Weak<StrongHandle>,
    id: UntypedAssetId,
}

#[derive(Default)]
struct AssetInfos {
    path_map: HashMap<(PathBuf, TypeId), PathInfo>,
}

#[derive(Default)]
struct LoaderRegistry {
    loaders: Vec<Arc<dyn ErasedAssetLoader>>,
    by_extension: HashMap<String, usize>,
}

impl LoaderRegistry {
    fn push(&mut self, loader: Arc<dyn ErasedAssetLoader>) {
        let index = self.loaders.len();
        for extension in loader.extensions() {
            if let Some(previous) = self.by_extension.insert(extension.to_string(), index) {
                log::warn!(
                    "extension `{extension}` was already handled by loader #{previous}; replaced"
                );
            }
        }
        self.loaders.push(loader);
    }

    fn for_extension(&self, extension: &str) -> Option<Arc<dyn ErasedAssetLoader>> {
        self.by_extension
            .get(extension)
            .map(|&index| self.loaders[index].clone())
    }
}

/// A loaded value on its way back to the main world.
enum InternalAssetEvent {
    Loaded {
        id: UntypedAssetId,
        value: Box<dyn Any + Send + Sync>,
    },
    Failed {
        id: UntypedAssetId,
    },
}

type ErasedInserter = Box<dyn Fn(&mut World, AssetIndex, Box<dyn Any + Send + Sync>) + Send + Sync>;

struct AssetServerData {
    infos: RwLock<AssetInfos>,
    loaders: RwLock<LoaderRegistry>,
    providers: RwLock<HashMap<TypeId, HandleProvider>>,
    inserters: RwLock<HashMap<TypeId, ErasedInserter>>,
    sender: Sender<InternalAssetEvent>,
    receiver: Receiver<InternalAssetEvent>,
    io_pool: rayon::ThreadPool,
}

/// Deduplicates path loads, dispatches files to loaders on a background
/// pool, and forwards finished values to the main world through a channel
/// drained by [`handle_internal_events`](AssetServer::handle_internal_events).
#[derive(Clone)]
pub struct AssetServer {
    data: Arc<AssetServerData>,
}

impl Resource for AssetServer {}

impl Default for AssetServer {
    fn default() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            data: Arc::new(AssetServerData {
                infos: RwLock::new(AssetInfos::default()),
                loaders: RwLock::new(LoaderRegistry::default()),
                providers: RwLock::new(HashMap::new()),
                inserters: RwLock::new(HashMap::new()),
                sender,
                receiver,
                io_pool: rayon::ThreadPoolBuilder::new()
                    .num_threads(2)
                    .thread_name(|index| format!("ember-asset-io-{index}"))
                    .build()
                    .expect("failed to build asset io pool"),
            }),
        }
    }
}

impl AssetServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handle provider and world inserter for asset type `A`.
    /// Called by `AssetApp::init_asset`.
    pub(crate) fn register_asset_type<A: Asset>(&self, provider: HandleProvider) {
        self.data
            .providers
            .write()
            .insert(TypeId::of::<A>(), provider);
        self.data.inserters.write().insert(
            TypeId::of::<A>(),
            Box::new(|world, index, value| {
                let value = *value
                    .downcast::<A>()
                    .expect("loaded value matches the registered asset type");
                let mut assets = world.resource_mut::<Assets<A>>();
                match assets.insert_with_index(index, value) {
                    Ok(_) => assets.queue_loaded_event(index),
                    Err(error) => {
                        // The last handle dropped while the load was in
                        // flight.
                        log::warn!("discarding loaded asset: {error}");
                    }
                }
            }),
        );
    }

    pub fn register_loader<L: AssetLoader>(&self, loader: L) {
        self.data.loaders.write().push(Arc::new(loader));
    }

    /// Queues a load of the asset at `path`, returning a strong handle
    /// immediately. Repeated calls for the same `(path, type)` return the
    /// same underlying handle while it is alive, and the loader runs exactly
    /// once per load.
    pub fn load<A: Asset>(&self, path: impl Into<PathBuf>) -> Handle<A> {
        let path = path.into();
        let type_id = TypeId::of::<A>();
        let mut infos = self.data.infos.write();
        if let Some(info) = infos.path_map.get(&(path.clone(), type_id)) {
            if let Some(strong) = info.handle.upgrade() {
                return Handle::Strong(strong);
            }
        }
        let provider = self
            .data
            .providers
            .read()
            .get(&type_id)
            .unwrap_or_else(|| {
                panic!(
                    "asset type `{}` is not initialized; call init_asset first",
                    std::any::type_name::<A>()
                )
            })
            .clone();
        let strong = provider.reserve_internal(true, Some(path.clone()));
        infos.path_map.insert(
            (path.clone(), type_id),
            PathInfo {
                handle: Arc::downgrade(&strong),
                id: strong.id(),
            },
        );
        drop(infos);

        self.spawn_load_task(strong.id(), path);
        Handle::Strong(strong)
    }

    fn spawn_load_task(&self, id: UntypedAssetId, path: PathBuf) {
        let data = self.data.clone();
        self.data.io_pool.spawn(move || {
            let result = load_path(&data, &path);
            let event = match result {
                Ok(value) => InternalAssetEvent::Loaded { id, value },
                Err(error) => {
                    log::error!("failed to load asset `{}`: {error}", path.display());
                    InternalAssetEvent::Failed { id }
                }
            };
            let _ = data.sender.send(event);
        });
    }

    /// Removes the path record for a dropped loader-managed handle. Returns
    /// `false` when a live handle exists again for the same id (the drop is
    /// then stale and the asset must be kept).
    pub(crate) fn process_handle_drop(&self, id: UntypedAssetId) -> bool {
        let mut infos = self.data.infos.write();
        let entry = infos
            .path_map
            .iter()
            .find(|(_, info)| info.id == id)
            .map(|(key, info)| (key.clone(), info.handle.upgrade().is_some()));
        match entry {
            Some((_, true)) => false,
            Some((key, false)) => {
                infos.path_map.remove(&key);
                true
            }
            // Record already replaced by a newer load of the same path; the
            // dropped slot is still dead and must be released.
            None => true,
        }
    }

    /// Exclusive system: drains finished loads and inserts them into their
    /// typed `Assets` collections, queuing `LoadedWithDependencies`.
    pub fn handle_internal_events(world: &mut World) {
        let Some(server) = world.get_resource::<AssetServer>().map(|s| s.clone()) else {
            return;
        };
        while let Ok(event) = server.data.receiver.try_recv() {
            match event {
                InternalAssetEvent::Loaded { id, value } => {
                    let InternalAssetId::Index(index) = id.internal() else {
                        continue;
                    };
                    let inserters = server.data.inserters.read();
                    match inserters.get(&id.type_id()) {
                        Some(inserter) => inserter(world, index, value),
                        None => log::error!(
                            "no inserter registered for loaded asset type {:?}",
                            id.type_id()
                        ),
                    }
                }
                InternalAssetEvent::Failed { id } => {
                    // The handle stays reserved and observable as "never
                    // loaded"; its eventual drop still releases the index.
                    log::debug!("load failed for asset {id:?}");
                }
            }
        }
    }
}

fn load_path(
    data: &Arc<AssetServerData>,
    path: &Path,
) -> Result<Box<dyn Any + Send + Sync>, AssetServerError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or("");
    let loader = data
        .loaders
        .read()
        .for_extension(extension)
        .ok_or_else(|| AssetServerError::MissingLoader {
            extension: extension.to_string(),
        })?;
    let mut context = LoadContext::new(path);
    loader
        .load_erased(path, &mut context)
        .map_err(|cause| AssetServerError::LoadFailed { cause })
}
