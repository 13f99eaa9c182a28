//! Reference-counted asset storage and background loading.
//!
//! [`Assets<A>`] stores values behind generational [`Handle`]s; dropping the
//! last strong handle releases the slot and emits lifecycle events. The
//! [`AssetServer`] deduplicates path loads and runs [`AssetLoader`]s on a
//! background pool, delivering finished values to the main world between
//! frames.

mod assets;
mod event;
mod handle;
mod id;
mod index;
mod loader;
mod server;

pub use assets::{AssetError, Assets, InvalidGenerationError};
pub use event::AssetEvent;
pub use handle::{Handle, HandleProvider, StrongHandle, UntypedHandle};
pub use id::{AssetId, UntypedAssetId};
pub use index::{AssetIndex, AssetIndexAllocator};
pub use loader::{AssetLoader, LoadContext, LoadError};
pub use server::{AssetServer, AssetServerError};

use ember_app::{App, Last, Plugin};
use ember_ecs::prelude::IntoSystemConfigs;
use ember_ecs::schedule::SetConfigs;

/// Types that can be stored in an [`Assets`] collection.
pub trait Asset: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Asset for T {}

/// Ordering for the per-frame asset maintenance systems in [`Last`]:
/// internal load delivery and handle-drop tracking run before queued events
/// are written to the app channels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AssetEventSystems {
    HandleEvents,
    WriteEvents,
}

/// Installs the [`AssetServer`] and the per-frame maintenance systems.
/// Asset types themselves are registered with [`AssetApp::init_asset`].
#[derive(Default)]
pub struct AssetPlugin;

impl Plugin for AssetPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(AssetServer::new());
        app.configure_sets(
            Last,
            SetConfigs::chained(
                AssetEventSystems::HandleEvents,
                AssetEventSystems::WriteEvents,
            ),
        );
        app.add_systems(
            Last,
            AssetServer::handle_internal_events.in_set(AssetEventSystems::HandleEvents),
        );
    }
}

/// App extension methods for registering asset types and loaders.
pub trait AssetApp {
    /// Registers `A`: its [`Assets`] collection, its event channel, and the
    /// maintenance systems that process handle drops and publish events.
    fn init_asset<A: Asset>(&mut self) -> &mut Self;

    /// Registers a loader with the [`AssetServer`].
    fn register_asset_loader<L: AssetLoader>(&mut self, loader: L) -> &mut Self;
}

impl AssetApp for App {
    fn init_asset<A: Asset>(&mut self) -> &mut Self {
        if self.world().contains_resource::<Assets<A>>() {
            return self;
        }
        let assets = Assets::<A>::default();
        let provider = assets.get_handle_provider();
        {
            let server = self
                .world()
                .get_resource::<AssetServer>()
                .map(|server| server.clone());
            match server {
                Some(server) => server.register_asset_type::<A>(provider),
                None => panic!("add AssetPlugin before calling init_asset"),
            }
        }
        self.insert_resource(assets);
        self.add_event::<AssetEvent<A>>();
        self.add_systems(
            Last,
            (
                Assets::<A>::track_assets.in_set(AssetEventSystems::HandleEvents),
                Assets::<A>::asset_events.in_set(AssetEventSystems::WriteEvents),
            ),
        );
        self
    }

    fn register_asset_loader<L: AssetLoader>(&mut self, loader: L) -> &mut Self {
        let server = self
            .world()
            .get_resource::<AssetServer>()
            .map(|server| server.clone())
            .expect("add AssetPlugin before registering loaders");
        server.register_loader(loader);
        self
    }
}

pub mod prelude {
    pub use crate::{
        Asset, AssetApp, AssetEvent, AssetPlugin, AssetServer, Assets, Handle, UntypedHandle,
    };
}
