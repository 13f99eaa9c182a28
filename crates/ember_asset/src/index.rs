use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender};

/// A generational, runtime-only identifier for an asset slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AssetIndex {
    index: u32,
    generation: u32,
}

impl AssetIndex {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the index into an opaque `u64` for transport.
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

/// Allocates generational [`AssetIndex`] values and facilitates their reuse.
///
/// Every reservation (fresh or recycled) is also published on the `reserved`
/// channel, so the slot storage can observe reservations in creation order
/// when it next flushes.
pub struct AssetIndexAllocator {
    next: AtomicU32,
    free_sender: Sender<AssetIndex>,
    free_receiver: Receiver<AssetIndex>,
    reserved_sender: Sender<AssetIndex>,
    reserved_receiver: Receiver<AssetIndex>,
}

impl Default for AssetIndexAllocator {
    fn default() -> Self {
        let (free_sender, free_receiver) = crossbeam_channel::unbounded();
        let (reserved_sender, reserved_receiver) = crossbeam_channel::unbounded();
        Self {
            next: AtomicU32::new(0),
            free_sender,
            free_receiver,
            reserved_sender,
            reserved_receiver,
        }
    }
}

impl AssetIndexAllocator {
    /// Reserves an index: a recycled one with its generation bumped if any
    /// is free, otherwise a fresh index at generation zero.
    pub fn reserve(&self) -> AssetIndex {
        let reserved = if let Ok(free) = self.free_receiver.try_recv() {
            AssetIndex::new(free.index, free.generation.wrapping_add(1))
        } else {
            AssetIndex::new(self.next.fetch_add(1, Ordering::Relaxed), 0)
        };
        // An unbounded channel we hold both ends of cannot be disconnected.
        let _ = self.reserved_sender.send(reserved);
        reserved
    }

    /// Queues `index` for reuse. Only valid once nothing references the
    /// slot.
    pub fn release(&self, index: AssetIndex) {
        let _ = self.free_sender.send(index);
    }

    /// The number of index slots ever reserved.
    pub(crate) fn next_index(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    /// Drains reservations made since the last call, in creation order.
    pub(crate) fn drain_reserved(&self) -> impl Iterator<Item = AssetIndex> + '_ {
        self.reserved_receiver.try_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_indices_are_sequential() {
        let allocator = AssetIndexAllocator::default();
        assert_eq!(allocator.reserve(), AssetIndex::new(0, 0));
        assert_eq!(allocator.reserve(), AssetIndex::new(1, 0));
    }

    #[test]
    fn released_indices_return_with_bumped_generation() {
        let allocator = AssetIndexAllocator::default();
        let first = allocator.reserve();
        allocator.release(first);
        let reused = allocator.reserve();
        assert_eq!(reused.index(), first.index());
        assert_eq!(reused.generation(), first.generation() + 1);
    }

    #[test]
    fn reservations_are_published_in_creation_order() {
        let allocator = AssetIndexAllocator::default();
        let a = allocator.reserve();
        allocator.release(a);
        let b = allocator.reserve();
        let observed: Vec<_> = allocator.drain_reserved().collect();
        assert_eq!(observed, vec![a, b]);
    }

    #[test]
    fn bits_round_trip() {
        let index = AssetIndex::new(1337, 42);
        assert_eq!(AssetIndex::from_bits(index.to_bits()), index);
    }
}
