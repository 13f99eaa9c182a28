use crate::component::{Component, ComponentId, TypeRegistry};

/// A statically typed collection of components inserted or removed together.
///
/// Implemented for every [`Component`] and for tuples of bundles, so
/// `world.spawn((Position(..), Velocity(..)))` works the way it reads.
///
/// # Safety
/// `get_components` must call `func` exactly once per id pushed by
/// `component_ids`, in the same order, handing over ownership of a value of
/// the corresponding type. The pointee must not be dropped by the bundle
/// afterwards.
pub unsafe trait Bundle: Send + Sync + 'static {
    /// Registers (if needed) and collects this bundle's component ids, in
    /// declaration order.
    fn component_ids(registry: &TypeRegistry, ids: &mut Vec<ComponentId>);

    /// Moves each component out of the bundle, passing ownership through a
    /// raw pointer. The n-th call corresponds to the n-th id pushed by
    /// [`component_ids`](Bundle::component_ids).
    fn get_components(self, func: &mut impl FnMut(*mut u8));
}

// SAFETY: a single component trivially satisfies the one-call-per-id
// contract.
unsafe impl<C: Component> Bundle for C {
    fn component_ids(registry: &TypeRegistry, ids: &mut Vec<ComponentId>) {
        ids.push(registry.register_component::<C>());
    }

    fn get_components(self, func: &mut impl FnMut(*mut u8)) {
        let mut value = std::mem::ManuallyDrop::new(self);
        func(&mut *value as *mut C as *mut u8);
    }
}

macro_rules! impl_bundle_for_tuple {
    ($(($name:ident, $idx:tt)),*) => {
        // SAFETY: each member is itself a bundle honoring the contract, and
        // members are visited in declaration order.
        unsafe impl<$($name: Bundle),*> Bundle for ($($name,)*) {
            #[allow(unused_variables)]
            fn component_ids(registry: &TypeRegistry, ids: &mut Vec<ComponentId>) {
                $($name::component_ids(registry, ids);)*
            }

            #[allow(unused_variables)]
            fn get_components(self, func: &mut impl FnMut(*mut u8)) {
                $(self.$idx.get_components(func);)*
            }
        }
    };
}

impl_bundle_for_tuple!();
impl_bundle_for_tuple!((B0, 0));
impl_bundle_for_tuple!((B0, 0), (B1, 1));
impl_bundle_for_tuple!((B0, 0), (B1, 1), (B2, 2));
impl_bundle_for_tuple!((B0, 0), (B1, 1), (B2, 2), (B3, 3));
impl_bundle_for_tuple!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4));
impl_bundle_for_tuple!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4), (B5, 5));
impl_bundle_for_tuple!(
    (B0, 0),
    (B1, 1),
    (B2, 2),
    (B3, 3),
    (B4, 4),
    (B5, 5),
    (B6, 6)
);
impl_bundle_for_tuple!(
    (B0, 0),
    (B1, 1),
    (B2, 2),
    (B3, 3),
    (B4, 4),
    (B5, 5),
    (B6, 6),
    (B7, 7)
);
