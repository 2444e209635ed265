//! Registration storage: constructors, post-build actions, and conversions.
//!
//! Registrations are collected into a [`RegistryBuilder`] during startup —
//! usually by loading one or more [`FixtureSet`]s — and then sealed into an
//! immutable [`Registry`]. The registry is cheap to clone and shares its
//! storage, so a test harness builds it once and hands clones to every
//! factory that needs it. Nothing can be added after `finish()`, which is
//! what makes concurrent builds safe without any locking.

use std::collections::HashMap;
use std::sync::Arc;

use facet_core::{ConstTypeId, Facet, PtrMut, Shape};
use tracing::debug;

use crate::builder::{RawSources, Sources};
use crate::error::{BuildError, RegistryError};
use crate::value::OwnedValue;

pub(crate) type ErasedConstructor =
    Box<dyn Fn(&mut RawSources<'_>) -> Result<OwnedValue, BuildError> + Send + Sync>;

pub(crate) type ErasedPostBuild = Box<dyn Fn(PtrMut) + Send + Sync>;

/// A registered conversion from one shape to another, owned by the type
/// whose builds may need it.
pub(crate) struct Conversion {
    pub(crate) source: &'static Shape,
    pub(crate) dest: &'static Shape,
    pub(crate) apply: Box<dyn Fn(OwnedValue) -> Result<OwnedValue, BuildError> + Send + Sync>,
}

/// Everything registered for one type.
#[derive(Default)]
pub(crate) struct TypeRegistration {
    pub(crate) constructor: Option<ErasedConstructor>,
    pub(crate) post_build: Option<ErasedPostBuild>,
    pub(crate) conversions: HashMap<(ConstTypeId, ConstTypeId), Conversion>,
}

/// A named bundle of registrations, loaded into a [`RegistryBuilder`] during
/// startup.
///
/// Implement this once per module or crate that contributes fixture types:
///
/// ```rust,ignore
/// struct MoneyFixtures;
///
/// impl FixtureSet for MoneyFixtures {
///     fn load(&self, registry: &mut RegistryBuilder) -> Result<(), RegistryError> {
///         registry.conversion::<Order, i64, Money, _>(Money::from_minor_units)?;
///         Ok(())
///     }
/// }
/// ```
pub trait FixtureSet {
    /// Adds this set's registrations to the builder.
    ///
    /// Duplicates against anything already loaded are errors, not overrides.
    fn load(&self, registry: &mut RegistryBuilder) -> Result<(), RegistryError>;
}

/// Mutable collection phase of the registry.
///
/// Every add is checked against what is already present: a second
/// constructor, post-build action, or identical conversion pair for the same
/// type fails immediately, so conflicting fixture sets surface at startup.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<ConstTypeId, (&'static Shape, TypeRegistration)>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for `T`, used instead of default construction
    /// whenever a `T` must be materialized during a build.
    ///
    /// The constructor receives [`Sources`], through which it can consume
    /// directive values recorded on the builder; values it consumes are not
    /// assigned again afterwards.
    pub fn constructor<T, F>(&mut self, f: F) -> Result<&mut Self, RegistryError>
    where
        T: Facet<'static>,
        F: Fn(&mut Sources<'_, '_, T>) -> Result<T, BuildError> + Send + Sync + 'static,
    {
        let entry = self.entry(T::SHAPE);
        if entry.constructor.is_some() {
            return Err(RegistryError::DuplicateConstructor { shape: T::SHAPE });
        }
        debug!(shape = %T::SHAPE, "registering constructor");
        entry.constructor = Some(Box::new(move |raw: &mut RawSources<'_>| {
            let mut sources = Sources::new(raw);
            Ok(OwnedValue::new(f(&mut sources)?))
        }));
        Ok(self)
    }

    /// Registers an action to run on every `T` right after its build
    /// completes, with all directives applied.
    pub fn post_build<T, F>(&mut self, f: F) -> Result<&mut Self, RegistryError>
    where
        T: Facet<'static>,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let entry = self.entry(T::SHAPE);
        if entry.post_build.is_some() {
            return Err(RegistryError::DuplicatePostBuild { shape: T::SHAPE });
        }
        debug!(shape = %T::SHAPE, "registering post-build action");
        entry.post_build = Some(Box::new(move |ptr: PtrMut| {
            // SAFETY: the walker only invokes post-build through a pointer to
            // a live T, selected by T's own shape.
            let value = unsafe { ptr.as_mut::<T>() };
            f(value);
        }));
        Ok(self)
    }

    /// Registers a conversion from `S` to `D`, consulted when a build of `T`
    /// finds a directive value of shape `S` destined for a property of shape
    /// `D`.
    pub fn conversion<T, S, D, F>(&mut self, f: F) -> Result<&mut Self, RegistryError>
    where
        T: Facet<'static>,
        S: Facet<'static>,
        D: Facet<'static>,
        F: Fn(S) -> D + Send + Sync + 'static,
    {
        let entry = self.entry(T::SHAPE);
        let pair = (S::SHAPE.id, D::SHAPE.id);
        if entry.conversions.contains_key(&pair) {
            return Err(RegistryError::DuplicateConversion {
                owner: T::SHAPE,
                source: S::SHAPE,
                dest: D::SHAPE,
            });
        }
        debug!(owner = %T::SHAPE, source = %S::SHAPE, dest = %D::SHAPE, "registering conversion");
        entry.conversions.insert(
            pair,
            Conversion {
                source: S::SHAPE,
                dest: D::SHAPE,
                apply: Box::new(move |value: OwnedValue| {
                    let source: S =
                        value
                            .try_materialize()
                            .map_err(|value| BuildError::ShapeMismatch {
                                key: "<conversion>".to_string(),
                                expected: S::SHAPE,
                                actual: value.shape(),
                            })?;
                    Ok(OwnedValue::new(f(source)))
                }),
            },
        );
        Ok(self)
    }

    /// Loads a whole fixture set.
    pub fn load(&mut self, set: &dyn FixtureSet) -> Result<&mut Self, RegistryError> {
        set.load(self)?;
        Ok(self)
    }

    /// Folds another builder's registrations into this one.
    ///
    /// The same duplicate rules apply as for direct registration, so two
    /// builders that both registered a constructor for the same type cannot
    /// be merged.
    pub fn merge(&mut self, other: RegistryBuilder) -> Result<&mut Self, RegistryError> {
        for (id, (shape, incoming)) in other.entries {
            let (_, entry) = self
                .entries
                .entry(id)
                .or_insert_with(|| (shape, TypeRegistration::default()));
            if let Some(ctor) = incoming.constructor {
                if entry.constructor.is_some() {
                    return Err(RegistryError::DuplicateConstructor { shape });
                }
                entry.constructor = Some(ctor);
            }
            if let Some(action) = incoming.post_build {
                if entry.post_build.is_some() {
                    return Err(RegistryError::DuplicatePostBuild { shape });
                }
                entry.post_build = Some(action);
            }
            for (pair, conversion) in incoming.conversions {
                if entry.conversions.contains_key(&pair) {
                    return Err(RegistryError::DuplicateConversion {
                        owner: shape,
                        source: conversion.source,
                        dest: conversion.dest,
                    });
                }
                entry.conversions.insert(pair, conversion);
            }
        }
        Ok(self)
    }

    /// Seals the collected registrations into an immutable [`Registry`].
    pub fn finish(self) -> Registry {
        debug!(types = self.entries.len(), "sealing registry");
        Registry {
            entries: Arc::new(
                self.entries
                    .into_iter()
                    .map(|(id, (_, entry))| (id, entry))
                    .collect(),
            ),
        }
    }

    fn entry(&mut self, shape: &'static Shape) -> &mut TypeRegistration {
        let (_, entry) = self
            .entries
            .entry(shape.id)
            .or_insert_with(|| (shape, TypeRegistration::default()));
        entry
    }
}

/// Immutable, shareable registration store.
///
/// Produced by [`RegistryBuilder::finish`]; cloning is a reference-count
/// bump.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<HashMap<ConstTypeId, TypeRegistration>>,
}

impl Registry {
    /// Looks up the registrations for a shape, if any.
    pub(crate) fn registration(&self, shape: &'static Shape) -> Option<&TypeRegistration> {
        self.entries.get(&shape.id)
    }

    /// Looks up a conversion registered for `owner` from `source` to `dest`.
    pub(crate) fn conversion(
        &self,
        owner: &'static Shape,
        source: &'static Shape,
        dest: &'static Shape,
    ) -> Option<&Conversion> {
        self.registration(owner)?
            .conversions
            .get(&(source.id, dest.id))
    }
}

impl core::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("types", &self.entries.len())
            .finish()
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet::Facet;

    #[derive(Facet, Default)]
    #[facet(auto_traits)]
    #[allow(dead_code)]
    struct Order {
        total: i64,
    }

    #[derive(Facet, Default, PartialEq, Debug)]
    #[facet(auto_traits)]
    #[allow(dead_code)]
    struct Money {
        minor_units: i64,
    }

    #[test]
    fn second_constructor_for_a_type_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .constructor::<Order, _>(|_| Ok(Order::default()))
            .unwrap();
        let err = builder
            .constructor::<Order, _>(|_| Ok(Order::default()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateConstructor { .. }));
    }

    #[test]
    fn second_conversion_for_the_same_pair_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .conversion::<Order, i64, Money, _>(|n| Money { minor_units: n })
            .unwrap();
        let err = builder
            .conversion::<Order, i64, Money, _>(|n| Money { minor_units: n * 100 })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateConversion { .. }));
    }

    #[test]
    fn conversions_for_different_pairs_coexist() {
        let mut builder = RegistryBuilder::new();
        builder
            .conversion::<Order, i64, Money, _>(|n| Money { minor_units: n })
            .unwrap()
            .conversion::<Order, i32, Money, _>(|n| Money {
                minor_units: n as i64,
            })
            .unwrap();
        let registry = builder.finish();
        assert!(registry
            .conversion(Order::SHAPE, i64::SHAPE, Money::SHAPE)
            .is_some());
        assert!(registry
            .conversion(Order::SHAPE, i32::SHAPE, Money::SHAPE)
            .is_some());
        assert!(registry
            .conversion(Order::SHAPE, u8::SHAPE, Money::SHAPE)
            .is_none());
    }

    #[test]
    fn merge_detects_conflicts_across_builders() {
        let mut a = RegistryBuilder::new();
        a.constructor::<Order, _>(|_| Ok(Order::default())).unwrap();
        let mut b = RegistryBuilder::new();
        b.constructor::<Order, _>(|_| Ok(Order::default())).unwrap();
        let err = a.merge(b).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateConstructor { .. }));
    }

    #[test]
    fn merge_combines_disjoint_registrations() {
        let mut a = RegistryBuilder::new();
        a.constructor::<Order, _>(|_| Ok(Order::default())).unwrap();
        let mut b = RegistryBuilder::new();
        b.conversion::<Order, i64, Money, _>(|n| Money { minor_units: n })
            .unwrap();
        a.merge(b).unwrap();
        let registry = a.finish();
        let entry = registry.registration(Order::SHAPE).unwrap();
        assert!(entry.constructor.is_some());
        assert_eq!(entry.conversions.len(), 1);
    }

    #[test]
    fn fixture_sets_load_through_the_builder() {
        struct MoneySet;
        impl FixtureSet for MoneySet {
            fn load(&self, registry: &mut RegistryBuilder) -> Result<(), RegistryError> {
                registry.conversion::<Order, i64, Money, _>(|n| Money { minor_units: n })?;
                Ok(())
            }
        }
        let mut builder = RegistryBuilder::new();
        builder.load(&MoneySet).unwrap();
        let registry = builder.finish();
        assert!(registry
            .conversion(Order::SHAPE, i64::SHAPE, Money::SHAPE)
            .is_some());
    }
}
