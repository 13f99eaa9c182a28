use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_app::{App, Update};
use ember_asset::{
    AssetApp, AssetEvent, AssetLoader, AssetPlugin, AssetServer, Assets, Handle, LoadContext,
    LoadError,
};
use ember_ecs::prelude::*;

#[derive(Debug, PartialEq)]
struct TextAsset(String);

struct TextLoader {
    invocations: Arc<AtomicUsize>,
}

impl AssetLoader for TextLoader {
    type Asset = TextAsset;

    fn extensions(&self) -> &[&str] {
        &["txt", "log"]
    }

    fn load(&self, _path: &Path, context: &mut LoadContext) -> Result<TextAsset, LoadError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(TextAsset(context.read_string()?))
    }
}

fn write_temp_file(name: &str, contents: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("ember-asset-test-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

fn wait_for<A: Send + Sync + 'static>(
    app: &mut App,
    handle: &Handle<A>,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        app.update();
        if app
            .world()
            .resource::<Assets<A>>()
            .get(handle.id())
            .is_some()
        {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn load_deduplicates_and_invokes_loader_once() {
    let path = write_temp_file("dedup.txt", "hello assets");
    let invocations = Arc::new(AtomicUsize::new(0));

    let mut app = App::new();
    app.add_plugins(AssetPlugin);
    app.init_asset::<TextAsset>();
    app.register_asset_loader(TextLoader {
        invocations: invocations.clone(),
    });

    let server = app.world().resource::<AssetServer>().clone();
    let first: Handle<TextAsset> = server.load(&path);
    let second: Handle<TextAsset> = server.load(&path);
    assert_eq!(first, second);
    assert!(first.is_strong() && second.is_strong());

    assert!(wait_for(&mut app, &first, Duration::from_secs(5)));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    let assets = app.world().resource::<Assets<TextAsset>>();
    assert_eq!(
        assets.get(first.id()),
        Some(&TextAsset("hello assets".to_string()))
    );

    std::fs::remove_file(path).ok();
}

#[test]
fn loaded_event_is_published() {
    let path = write_temp_file("events.txt", "payload");

    #[derive(Default)]
    struct Observed(bool);
    impl Resource for Observed {}

    fn observe(
        mut events: EventReader<AssetEvent<TextAsset>>,
        mut observed: ResMut<Observed>,
    ) {
        for event in events.read() {
            if matches!(event, AssetEvent::LoadedWithDependencies { .. }) {
                observed.0 = true;
            }
        }
    }

    let mut app = App::new();
    app.add_plugins(AssetPlugin);
    app.init_asset::<TextAsset>();
    app.register_asset_loader(TextLoader {
        invocations: Arc::new(AtomicUsize::new(0)),
    });
    app.init_resource::<Observed>();
    app.add_systems(Update, observe);

    let server = app.world().resource::<AssetServer>().clone();
    let handle: Handle<TextAsset> = server.load(&path);
    assert!(wait_for(&mut app, &handle, Duration::from_secs(5)));
    // One more frame so the Last-schedule event writer and the Update
    // reader both see the event.
    app.update();
    app.update();
    assert!(app.world().resource::<Observed>().0);

    std::fs::remove_file(path).ok();
}

#[test]
fn missing_loader_leaves_handle_unloaded() {
    let path = write_temp_file("unknown.bin", "raw");

    let mut app = App::new();
    app.add_plugins(AssetPlugin);
    app.init_asset::<TextAsset>();

    let server = app.world().resource::<AssetServer>().clone();
    let handle: Handle<TextAsset> = server.load(&path);
    assert!(
        !wait_for(&mut app, &handle, Duration::from_millis(200)),
        "an asset without a loader must never resolve"
    );
    // The handle stays reserved; dropping it releases the slot.
    drop(handle);
    app.update();

    std::fs::remove_file(path).ok();
}

#[test]
fn dropping_the_last_handle_unloads_the_asset() {
    let path = write_temp_file("drop.txt", "transient");
    let mut app = App::new();
    app.add_plugins(AssetPlugin);
    app.init_asset::<TextAsset>();
    app.register_asset_loader(TextLoader {
        invocations: Arc::new(AtomicUsize::new(0)),
    });

    let server = app.world().resource::<AssetServer>().clone();
    let handle: Handle<TextAsset> = server.load(&path);
    assert!(wait_for(&mut app, &handle, Duration::from_secs(5)));

    let id = handle.id();
    drop(handle);
    app.update();
    let assets = app.world().resource::<Assets<TextAsset>>();
    assert!(assets.get(id).is_none(), "dropped assets must unload");

    std::fs::remove_file(path).ok();
}
