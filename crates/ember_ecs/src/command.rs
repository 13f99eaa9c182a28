use std::mem::MaybeUninit;

use crate::{
    bundle::Bundle,
    component::Resource,
    entity::{Entities, Entity},
    world::World,
};

/// A deferred world mutation.
pub trait Command: Send + 'static {
    fn apply(self, world: &mut World);
}

impl<F: FnOnce(&mut World) + Send + 'static> Command for F {
    fn apply(self, world: &mut World) {
        self(world);
    }
}

struct CommandMeta {
    /// Applies (world = Some) or drops (world = None) the command at `ptr`.
    /// One function for both paths so an unapplied queue cannot leak.
    ///
    /// SAFETY: `ptr` must point at a live command value of the meta's type;
    /// the value is consumed either way.
    apply_or_drop: unsafe fn(ptr: *mut u8, world: Option<&mut World>),
    size: usize,
}

/// A type-erased FIFO of deferred mutations: a byte buffer plus an ordered
/// descriptor list. Appending is O(1) amortized; [`apply`](Self::apply)
/// drains in first-in, first-out order.
#[derive(Default)]
pub struct CommandQueue {
    bytes: Vec<MaybeUninit<u8>>,
    metas: Vec<CommandMeta>,
}

// SAFETY: commands are required to be Send.
unsafe impl Send for CommandQueue {}
unsafe impl Sync for CommandQueue {}

impl CommandQueue {
    pub fn push<C: Command>(&mut self, command: C) {
        let meta = CommandMeta {
            apply_or_drop: |ptr, world| {
                // SAFETY: per CommandMeta contract, `ptr` holds a live `C`.
                let command = unsafe { ptr.cast::<C>().read_unaligned() };
                match world {
                    Some(world) => command.apply(world),
                    None => drop(command),
                }
            },
            size: std::mem::size_of::<C>(),
        };
        let old_len = self.bytes.len();
        self.bytes.reserve(meta.size);
        // SAFETY: just reserved; values are stored unaligned and read back
        // with read_unaligned.
        unsafe {
            std::ptr::copy_nonoverlapping(
                &command as *const C as *const MaybeUninit<u8>,
                self.bytes.as_mut_ptr().add(old_len),
                meta.size,
            );
            self.bytes.set_len(old_len + meta.size);
        }
        std::mem::forget(command);
        self.metas.push(meta);
    }

    /// Moves all of `other`'s commands onto the end of this queue,
    /// preserving their order and leaving `other` empty.
    pub fn append(&mut self, other: &mut CommandQueue) {
        self.bytes.append(&mut other.bytes);
        self.metas.append(&mut other.metas);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Applies every queued command to `world` in FIFO order, leaving the
    /// queue empty. Reserved entities are flushed first so commands can
    /// target them.
    pub fn apply(&mut self, world: &mut World) {
        world.flush_entities();
        self.consume(Some(world));
    }

    fn consume(&mut self, mut world: Option<&mut World>) {
        let mut offset = 0;
        let bytes = std::mem::take(&mut self.bytes);
        let metas = std::mem::take(&mut self.metas);
        for meta in &metas {
            // SAFETY: `offset` walks the packed layout produced by `push`.
            unsafe {
                (meta.apply_or_drop)(
                    bytes.as_ptr().add(offset) as *mut u8,
                    world.as_deref_mut(),
                );
            }
            offset += meta.size;
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.consume(None);
    }
}

/// A buffered view for issuing deferred world mutations from a system.
///
/// Entity ids handed out by [`spawn`](Self::spawn) are reserved immediately
/// (lock-free) and become valid when the queue is applied between systems.
pub struct Commands<'w, 's> {
    queue: &'s mut CommandQueue,
    entities: &'w Entities,
}

impl<'w, 's> Commands<'w, 's> {
    pub fn new(queue: &'s mut CommandQueue, entities: &'w Entities) -> Self {
        Self { queue, entities }
    }

    /// Reserves a new entity and queues insertion of `bundle` onto it.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityCommands<'w, 's, '_> {
        let mut entity_commands = self.spawn_empty();
        entity_commands.insert(bundle);
        entity_commands
    }

    /// Reserves a new, empty entity.
    pub fn spawn_empty(&mut self) -> EntityCommands<'w, 's, '_> {
        let entity = self.entities.reserve_entity();
        EntityCommands {
            entity,
            commands: self,
        }
    }

    /// Builders targeting an existing (or reserved) entity.
    pub fn entity(&mut self, entity: Entity) -> EntityCommands<'w, 's, '_> {
        EntityCommands {
            entity,
            commands: self,
        }
    }

    pub fn insert_resource<R: Resource>(&mut self, resource: R) {
        self.queue.push(move |world: &mut World| {
            world.insert_resource(resource);
        });
    }

    pub fn remove_resource<R: Resource>(&mut self) {
        self.queue.push(move |world: &mut World| {
            world.remove_resource::<R>();
        });
    }

    /// Queues an arbitrary closure with full world access.
    pub fn queue<C: Command>(&mut self, command: C) {
        self.queue.push(command);
    }
}

/// Deferred mutation builders scoped to one entity.
pub struct EntityCommands<'w, 's, 'a> {
    entity: Entity,
    commands: &'a mut Commands<'w, 's>,
}

impl EntityCommands<'_, '_, '_> {
    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        let entity = self.entity;
        self.commands.queue.push(move |world: &mut World| {
            match world.get_entity_mut(entity) {
                Some(mut entity_mut) => {
                    entity_mut.insert(bundle);
                }
                None => log::warn!(
                    "could not insert components: entity {entity:?} no longer exists"
                ),
            }
        });
        self
    }

    pub fn remove<B: Bundle>(&mut self) -> &mut Self {
        let entity = self.entity;
        self.commands.queue.push(move |world: &mut World| {
            if let Some(mut entity_mut) = world.get_entity_mut(entity) {
                entity_mut.remove::<B>();
            }
        });
        self
    }

    pub fn despawn(&mut self) {
        let entity = self.entity;
        self.commands.queue.push(move |world: &mut World| {
            if !world.despawn(entity) {
                log::warn!("could not despawn: entity {entity:?} no longer exists");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: i32,
        y: i32,
    }
    impl Component for Position {}

    #[derive(Debug, PartialEq, Default)]
    struct Counter(u32);
    impl Resource for Counter {}

    #[test]
    fn spawn_then_insert_via_queue() {
        let mut world = World::new();
        let mut queue = CommandQueue::default();
        let entity = {
            let mut commands = Commands::new(&mut queue, world.entities());
            commands.spawn_empty().id()
        };
        {
            let mut commands = Commands::new(&mut queue, world.entities());
            commands.entity(entity).insert(Position { x: 1, y: 2 });
        }
        queue.apply(&mut world);
        assert_eq!(world.get::<Position>(entity), Some(&Position { x: 1, y: 2 }));
    }

    #[test]
    fn apply_is_fifo() {
        let mut world = World::new();
        world.insert_resource(Counter(0));
        let mut queue = CommandQueue::default();
        for i in 1..=3u32 {
            queue.push(move |world: &mut World| {
                let mut counter = world.resource_mut::<Counter>();
                counter.0 = counter.0 * 10 + i;
            });
        }
        queue.apply(&mut world);
        assert_eq!(world.resource::<Counter>().0, 123);
    }

    #[test]
    fn append_preserves_order_and_empties_source() {
        let mut world = World::new();
        world.insert_resource(Counter(0));
        let mut first = CommandQueue::default();
        let mut second = CommandQueue::default();
        first.push(|world: &mut World| world.resource_mut::<Counter>().0 += 1);
        second.push(|world: &mut World| {
            let mut counter = world.resource_mut::<Counter>();
            counter.0 *= 100;
        });
        first.append(&mut second);
        assert!(second.is_empty());
        first.apply(&mut world);
        assert_eq!(world.resource::<Counter>().0, 100);
    }

    #[test]
    fn empty_queue_apply_is_a_noop() {
        let mut world = World::new();
        let entity = world.spawn(Position { x: 0, y: 0 }).id();
        let mut queue = CommandQueue::default();
        queue.apply(&mut world);
        assert_eq!(world.get::<Position>(entity), Some(&Position { x: 0, y: 0 }));
    }

    #[test]
    fn unapplied_commands_are_dropped() {
        let payload = std::sync::Arc::new(());
        {
            let mut queue = CommandQueue::default();
            let captured = payload.clone();
            queue.push(move |_world: &mut World| {
                let _ = &captured;
            });
            assert_eq!(std::sync::Arc::strong_count(&payload), 2);
        }
        assert_eq!(std::sync::Arc::strong_count(&payload), 1);
    }

    #[test]
    fn despawn_via_commands() {
        let mut world = World::new();
        let entity = world.spawn(Position { x: 0, y: 0 }).id();
        let mut queue = CommandQueue::default();
        {
            let mut commands = Commands::new(&mut queue, world.entities());
            commands.entity(entity).despawn();
        }
        queue.apply(&mut world);
        assert!(!world.contains_entity(entity));
    }
}
