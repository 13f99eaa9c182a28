//! An Entity Component System with a parallel, access-aware system
//! dispatcher.
//!
//! The [`World`](world::World) stores entities, typed components, resources
//! and events; [`Schedule`](schedule::Schedule)s hold systems with declared
//! ordering, and the [`SystemDispatcher`](schedule::SystemDispatcher) runs
//! compatible systems concurrently on a shared thread pool while deferring
//! structural mutations through [`Commands`](command::Commands).

pub mod archetype;
pub mod bundle;
pub mod change_detection;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod query;
pub mod resource;
pub mod schedule;
pub mod storage;
pub mod system;
pub mod tick;
pub mod world;

pub mod prelude {
    pub use crate::{
        bundle::Bundle,
        change_detection::{Mut, Res, ResMut},
        command::Commands,
        component::{Component, Resource, StorageType},
        entity::Entity,
        error::EcsError,
        event::Events,
        query::{Has, Query, With, Without},
        schedule::{
            ExecuteConfig, IntoSetConfigs, IntoSystemConfigs, Schedule, ScheduleLabel, Schedules,
            SystemDispatcher, SystemSet,
        },
        system::{EventReader, EventWriter, IntoSystem, Local, System},
        world::World,
    };
}
