//! Ember is a data-oriented application framework: an ECS world with a
//! parallel, access-aware scheduler, an app/plugin layer driving named
//! schedules, and a reference-counted asset pipeline with background
//! loading.
//!
//! ```
//! use ember::prelude::*;
//!
//! #[derive(Debug)]
//! struct Position {
//!     x: f32,
//! }
//! impl Component for Position {}
//!
//! fn drift(mut query: Query<&mut Position>) {
//!     for mut position in query.iter() {
//!         position.x += 1.0;
//!     }
//! }
//!
//! let mut app = App::new();
//! app.add_systems(Update, drift);
//! app.world_mut().spawn(Position { x: 0.0 });
//! app.update();
//! ```

pub use ember_app as app;
pub use ember_asset as asset;
pub use ember_ecs as ecs;

pub mod prelude {
    pub use ember_app::prelude::*;
    pub use ember_asset::prelude::*;
    pub use ember_ecs::prelude::*;
}
