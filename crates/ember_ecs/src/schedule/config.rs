use crate::{
    schedule::label::{BoxedSystemSet, IntoSystemSet, SystemSet, SystemTypeSet},
    system::{BoxedSystem, IntoSystem},
};

/// One system plus its declared relations, prior to graph construction.
pub struct SystemConfig {
    pub(crate) system: BoxedSystem,
    /// Sets this system is a member of. Always includes the system's
    /// type-level set so plain functions can be referenced in relations.
    pub(crate) sets: Vec<BoxedSystemSet>,
    pub(crate) before: Vec<BoxedSystemSet>,
    pub(crate) after: Vec<BoxedSystemSet>,
}

/// A tree of system configs as produced by tuple syntax, `.chain()` and
/// friends.
pub struct SystemConfigs {
    pub(crate) configs: Vec<SystemConfig>,
    pub(crate) chained: bool,
}

impl SystemConfigs {
    pub fn in_set(mut self, set: impl SystemSet) -> Self {
        let set: BoxedSystemSet = Box::new(set);
        for config in &mut self.configs {
            config.sets.push(set.clone());
        }
        self
    }

    pub fn before<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        let set = set.into_system_set();
        for config in &mut self.configs {
            config.before.push(set.clone());
        }
        self
    }

    pub fn after<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        let set = set.into_system_set();
        for config in &mut self.configs {
            config.after.push(set.clone());
        }
        self
    }

    /// Imposes a total order over the member systems, in declaration order.
    pub fn chain(mut self) -> Self {
        self.chained = true;
        self
    }
}

/// Anything that can be added to a schedule as one or more systems.
pub trait IntoSystemConfigs<Marker>: Sized {
    fn into_configs(self) -> SystemConfigs;

    fn in_set(self, set: impl SystemSet) -> SystemConfigs {
        self.into_configs().in_set(set)
    }

    fn before<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().before(set)
    }

    fn after<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().after(set)
    }

    fn chain(self) -> SystemConfigs {
        self.into_configs().chain()
    }
}

impl IntoSystemConfigs<()> for SystemConfigs {
    fn into_configs(self) -> SystemConfigs {
        self
    }
}

impl<Marker: 'static, F> IntoSystemConfigs<Marker> for F
where
    F: IntoSystem<Marker> + 'static,
{
    fn into_configs(self) -> SystemConfigs {
        let type_set: BoxedSystemSet = Box::new(SystemTypeSet::of::<F>());
        SystemConfigs {
            configs: vec![SystemConfig {
                system: Box::new(self.into_system()),
                sets: vec![type_set],
                before: Vec::new(),
                after: Vec::new(),
            }],
            chained: false,
        }
    }
}

macro_rules! impl_into_system_configs_for_tuple {
    ($(($name:ident, $marker:ident)),+) => {
        impl<$($name, $marker),+> IntoSystemConfigs<($($marker,)+)> for ($($name,)+)
        where
            $($name: IntoSystemConfigs<$marker>,)+
        {
            #[allow(non_snake_case)]
            fn into_configs(self) -> SystemConfigs {
                let ($($name,)+) = self;
                let mut configs = Vec::new();
                $(configs.extend($name.into_configs().configs);)+
                SystemConfigs {
                    configs,
                    chained: false,
                }
            }
        }
    };
}

impl_into_system_configs_for_tuple!((S0, M0));
impl_into_system_configs_for_tuple!((S0, M0), (S1, M1));
impl_into_system_configs_for_tuple!((S0, M0), (S1, M1), (S2, M2));
impl_into_system_configs_for_tuple!((S0, M0), (S1, M1), (S2, M2), (S3, M3));
impl_into_system_configs_for_tuple!((S0, M0), (S1, M1), (S2, M2), (S3, M3), (S4, M4));
impl_into_system_configs_for_tuple!(
    (S0, M0),
    (S1, M1),
    (S2, M2),
    (S3, M3),
    (S4, M4),
    (S5, M5)
);
impl_into_system_configs_for_tuple!(
    (S0, M0),
    (S1, M1),
    (S2, M2),
    (S3, M3),
    (S4, M4),
    (S5, M5),
    (S6, M6)
);
impl_into_system_configs_for_tuple!(
    (S0, M0),
    (S1, M1),
    (S2, M2),
    (S3, M3),
    (S4, M4),
    (S5, M5),
    (S6, M6),
    (S7, M7)
);

/// Ordering relations declared on a set (via `configure_sets`).
pub struct SetConfig {
    pub(crate) set: BoxedSystemSet,
    pub(crate) before: Vec<BoxedSystemSet>,
    pub(crate) after: Vec<BoxedSystemSet>,
}

pub struct SetConfigs {
    pub(crate) configs: Vec<SetConfig>,
    pub(crate) chained: bool,
}

impl SetConfigs {
    pub fn before<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        let set = set.into_system_set();
        for config in &mut self.configs {
            config.before.push(set.clone());
        }
        self
    }

    pub fn after<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        let set = set.into_system_set();
        for config in &mut self.configs {
            config.after.push(set.clone());
        }
        self
    }

    pub fn chain(mut self) -> Self {
        self.chained = true;
        self
    }
}

/// Marker for the [`SetConfigs`] identity conversion.
pub struct IsSetConfigs;

/// Marker for single-set conversions.
pub struct IsSingleSet;

pub trait IntoSetConfigs<Marker>: Sized {
    fn into_set_configs(self) -> SetConfigs;

    fn before<M>(self, set: impl IntoSystemSet<M>) -> SetConfigs {
        self.into_set_configs().before(set)
    }

    fn after<M>(self, set: impl IntoSystemSet<M>) -> SetConfigs {
        self.into_set_configs().after(set)
    }

    fn chain(self) -> SetConfigs {
        self.into_set_configs().chain()
    }
}

impl IntoSetConfigs<IsSetConfigs> for SetConfigs {
    fn into_set_configs(self) -> SetConfigs {
        self
    }
}

impl<S: SystemSet> IntoSetConfigs<IsSingleSet> for S {
    fn into_set_configs(self) -> SetConfigs {
        SetConfigs {
            configs: vec![SetConfig {
                set: Box::new(self),
                before: Vec::new(),
                after: Vec::new(),
            }],
            chained: false,
        }
    }
}

impl SetConfigs {
    /// Builds the configs for an ordered pair of sets (`first` runs before
    /// `second`). Richer arrangements compose through
    /// [`before`](Self::before)/[`after`](Self::after).
    pub fn chained(first: impl SystemSet, second: impl SystemSet) -> Self {
        let first_boxed: BoxedSystemSet = Box::new(first);
        SetConfigs {
            configs: vec![
                SetConfig {
                    set: first_boxed.clone(),
                    before: Vec::new(),
                    after: Vec::new(),
                },
                SetConfig {
                    set: Box::new(second),
                    before: Vec::new(),
                    after: vec![first_boxed],
                },
            ],
            chained: false,
        }
    }
}
