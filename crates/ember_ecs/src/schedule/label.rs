use std::any::Any;
use std::hash::{Hash, Hasher};

/// Object-safe equality for label types.
pub trait DynEq: Any {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynEq) -> bool;
}

impl<T: Any + Eq> DynEq for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynEq) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// Object-safe hashing for label types.
pub trait DynHash: DynEq {
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: DynEq + Hash> DynHash for T {
    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        // Include the concrete type so distinct label types with identical
        // payloads hash apart.
        self.type_id().hash(&mut state);
        T::hash(self, &mut state);
    }
}

/// Defines a boxed-label trait. Any `Clone + Eq + Hash + Debug` type is
/// usable as a label; boxed labels compare and hash by concrete type plus
/// value.
#[macro_export]
macro_rules! define_label {
    ($(#[$attr:meta])* $trait_name:ident, $boxed_name:ident) => {
        $(#[$attr])*
        pub trait $trait_name:
            'static + Send + Sync + std::fmt::Debug + $crate::schedule::label::DynEq + $crate::schedule::label::DynHash
        {
            fn dyn_clone(&self) -> $boxed_name;
        }

        impl<T> $trait_name for T
        where
            T: 'static
                + Send
                + Sync
                + Clone
                + Eq
                + std::hash::Hash
                + std::fmt::Debug,
        {
            fn dyn_clone(&self) -> $boxed_name {
                Box::new(self.clone())
            }
        }

        pub type $boxed_name = Box<dyn $trait_name>;

        impl PartialEq for dyn $trait_name {
            fn eq(&self, other: &Self) -> bool {
                $crate::schedule::label::DynEq::dyn_eq(self, other.as_any_dyn())
            }
        }

        impl Eq for dyn $trait_name {}

        impl std::hash::Hash for dyn $trait_name {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                self.dyn_hash(state);
            }
        }

        impl dyn $trait_name {
            fn as_any_dyn(&self) -> &dyn $crate::schedule::label::DynEq {
                self
            }
        }

        impl Clone for $boxed_name {
            fn clone(&self) -> Self {
                $trait_name::dyn_clone(self.as_ref())
            }
        }
    };
}

define_label!(
    /// Names a schedule. Unit structs and enums deriving
    /// `Clone + Eq + Hash + Debug` qualify automatically.
    ScheduleLabel,
    BoxedScheduleLabel
);

define_label!(
    /// Names a group of systems addressed together for ordering.
    SystemSet,
    BoxedSystemSet
);

/// The implicit set containing every instance of one system function,
/// letting plain functions appear in `before`/`after` relations.
#[derive(Clone, Eq)]
pub struct SystemTypeSet {
    type_id: std::any::TypeId,
    name: &'static str,
}

impl SystemTypeSet {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: std::any::TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for SystemTypeSet {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Hash for SystemTypeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Debug for SystemTypeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SystemTypeSet({})",
            self.name.rsplit("::").next().unwrap_or(self.name)
        )
    }
}

/// Conversion into a boxed [`SystemSet`]: either a set value itself or a
/// system function (through its [`SystemTypeSet`]).
pub trait IntoSystemSet<Marker> {
    fn into_system_set(self) -> BoxedSystemSet;
}

/// Marker for the identity conversion.
pub struct IsSet;

impl<S: SystemSet> IntoSystemSet<IsSet> for S {
    fn into_system_set(self) -> BoxedSystemSet {
        Box::new(self)
    }
}

/// Marker for the system-function conversion.
pub struct IsFunctionSet;

impl<Marker: 'static, F> IntoSystemSet<(IsFunctionSet, Marker)> for F
where
    F: crate::system::SystemParamFunction<Marker>,
{
    fn into_system_set(self) -> BoxedSystemSet {
        Box::new(SystemTypeSet::of::<F>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    struct Update;

    #[derive(Clone, Eq, PartialEq, Hash, Debug)]
    enum Stage {
        Pre,
        Post,
    }

    #[test]
    fn boxed_labels_compare_by_type_and_value() {
        let a: BoxedScheduleLabel = Box::new(Update);
        let b: BoxedScheduleLabel = Box::new(Update);
        let c: BoxedScheduleLabel = Box::new(Stage::Pre);
        let d: BoxedScheduleLabel = Box::new(Stage::Post);
        assert_eq!(a, b);
        assert_ne!(c, d);
        assert_ne!(a, c);
    }

    #[test]
    fn boxed_labels_are_map_keys() {
        let mut map: HashMap<BoxedScheduleLabel, u32> = HashMap::new();
        map.insert(Box::new(Update), 1);
        map.insert(Box::new(Stage::Pre), 2);
        assert_eq!(map.get(&(Box::new(Update) as BoxedScheduleLabel)), Some(&1));
        assert_eq!(map.len(), 2);
        map.insert(Box::new(Update), 3);
        assert_eq!(map.len(), 2);
    }
}
