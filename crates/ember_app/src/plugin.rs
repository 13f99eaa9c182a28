use downcast_rs::{impl_downcast, Downcast};

use crate::app::App;

/// A saved set of [`App`] additions: schedules, systems, resources, events.
///
/// Plugins must not rely on the ordering of other plugins' [`build`]
/// (Plugin::build) calls. Registrations made during `build` are visible to
/// every plugin's [`finish`](Plugin::finish), which runs once all builds are
/// done.
pub trait Plugin: Downcast + Send + Sync + 'static {
    /// Registers this plugin's schedules, systems, resources and events.
    fn build(&self, app: &mut App);

    /// Finalization after all plugins have built (e.g. allocating external
    /// handles that depend on other plugins' registrations).
    fn finish(&self, _app: &mut App) {}

    /// Used for duplicate detection and diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl_downcast!(Plugin);

impl<F: Fn(&mut App) + Send + Sync + 'static> Plugin for F {
    fn build(&self, app: &mut App) {
        self(app);
    }
}

/// Where a [`SubApp`](crate::SubApp)'s plugins are in their lifecycle.
///
/// [`SubApp`]: crate::sub_app::SubApp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginsState {
    /// Plugins are still being added and built.
    Adding,
    /// Every plugin's `finish` has run.
    Finished,
}

/// Types that add one or more [`Plugin`]s to an [`App`]; implemented for
/// single plugins and tuples of plugins.
pub trait Plugins<Marker> {
    fn add_to_app(self, app: &mut App);
}

/// Marker for the single-plugin conversion.
pub struct PluginMarker;

impl<P: Plugin> Plugins<PluginMarker> for P {
    fn add_to_app(self, app: &mut App) {
        app.add_boxed_plugin(Box::new(self));
    }
}

/// Marker for tuple conversions.
pub struct PluginsTupleMarker;

macro_rules! impl_plugins_for_tuple {
    ($(($name:ident, $marker:ident)),+) => {
        impl<$($name, $marker),+> Plugins<(PluginsTupleMarker, $($marker,)+)> for ($($name,)+)
        where
            $($name: Plugins<$marker>,)+
        {
            #[allow(non_snake_case)]
            fn add_to_app(self, app: &mut App) {
                let ($($name,)+) = self;
                $($name.add_to_app(app);)+
            }
        }
    };
}

impl_plugins_for_tuple!((P0, M0));
impl_plugins_for_tuple!((P0, M0), (P1, M1));
impl_plugins_for_tuple!((P0, M0), (P1, M1), (P2, M2));
impl_plugins_for_tuple!((P0, M0), (P1, M1), (P2, M2), (P3, M3));
impl_plugins_for_tuple!((P0, M0), (P1, M1), (P2, M2), (P3, M3), (P4, M4));
