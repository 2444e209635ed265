//! The per-instance builder: directive recording and the two-phase build.
//!
//! A [`Builder`] collects path directives, then `build()` runs two phases:
//! first the root is materialized (through a registered constructor if one
//! exists, otherwise through the shape's default construction), then every
//! directive the constructor did not consume is assigned into the instance,
//! auto-materializing missing intermediates along each path.

use core::marker::PhantomData;

use facet_core::{Def, Facet, Shape};
use tracing::{debug, trace};

use crate::error::BuildError;
use crate::path::ResolvedPath;
use crate::registry::Registry;
use crate::value::OwnedValue;
use crate::walk;

/// One recorded `path = value` instruction.
///
/// `value` becomes `None` once consumed — either by a constructor pulling it
/// through [`Sources`], or by the assignment pass.
pub(crate) struct Directive {
    pub(crate) path: ResolvedPath,
    pub(crate) value: Option<OwnedValue>,
}

/// Collects directives for a single instance of `T` and builds it.
///
/// Builders are single-use: `build()` takes the builder by value, so a spent
/// builder cannot be reused or observed afterwards. Obtain one from
/// [`Factory::create`](crate::Factory::create).
pub struct Builder<T> {
    registry: Registry,
    directives: Vec<Directive>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Facet<'static>> Builder<T> {
    pub(crate) fn new(registry: Registry) -> Self {
        Self {
            registry,
            directives: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Records `value` for the property at `path`.
    ///
    /// The path is resolved eagerly: unknown fields, duplicate paths, and
    /// values no destination could accept (no exact match, no option
    /// wrapping, no registered conversion) all fail here rather than at
    /// `build()`.
    pub fn with<V: Facet<'static>>(mut self, path: &str, value: V) -> Result<Self, BuildError> {
        let path = ResolvedPath::resolve(T::SHAPE, path)?;
        if self.directives.iter().any(|d| d.path == path) {
            return Err(BuildError::DuplicateDirective {
                key: path.key().to_string(),
            });
        }
        self.check_accepts(path.leaf(), V::SHAPE, path.key())?;
        trace!(key = path.key(), value_shape = %V::SHAPE, "recording directive");
        self.directives.push(Directive {
            path,
            value: Some(OwnedValue::new(value)),
        });
        Ok(self)
    }

    /// Records `value` for the property at `path` without checking that any
    /// destination accepts it.
    ///
    /// The path is still resolved and deduplicated eagerly, but conversion
    /// lookup is deferred to `build()`: if no conversion for the pair is
    /// registered by then, the build fails with
    /// [`NoConversionRegistered`](BuildError::NoConversionRegistered).
    pub fn with_converted<V: Facet<'static>>(
        mut self,
        path: &str,
        value: V,
    ) -> Result<Self, BuildError> {
        let path = ResolvedPath::resolve(T::SHAPE, path)?;
        if self.directives.iter().any(|d| d.path == path) {
            return Err(BuildError::DuplicateDirective {
                key: path.key().to_string(),
            });
        }
        trace!(key = path.key(), value_shape = %V::SHAPE, "recording converting directive");
        self.directives.push(Directive {
            path,
            value: Some(OwnedValue::new(value)),
        });
        Ok(self)
    }

    /// Records a whole collection for the list property at `path`.
    pub fn with_items<V>(
        self,
        path: &str,
        items: impl IntoIterator<Item = V>,
    ) -> Result<Self, BuildError>
    where
        V: Facet<'static>,
    {
        self.with(path, items.into_iter().collect::<Vec<V>>())
    }

    /// Builds a nested `U` through its own builder and records the result
    /// for the property at `path`.
    ///
    /// The nested build runs immediately, against the same registry.
    pub fn with_built<U, F>(self, path: &str, configure: F) -> Result<Self, BuildError>
    where
        U: Facet<'static>,
        F: FnOnce(Builder<U>) -> Result<Builder<U>, BuildError>,
    {
        let nested = configure(Builder::new(self.registry.clone()))?.build()?;
        self.with(path, nested)
    }

    /// Builds several nested `U`s and records them as a collection for the
    /// list property at `path`.
    pub fn with_built_items<U, I, F>(self, path: &str, configs: I) -> Result<Self, BuildError>
    where
        U: Facet<'static>,
        I: IntoIterator<Item = F>,
        F: FnOnce(Builder<U>) -> Result<Builder<U>, BuildError>,
    {
        let mut items = Vec::new();
        for configure in configs {
            items.push(configure(Builder::new(self.registry.clone()))?.build()?);
        }
        self.with(path, items)
    }

    /// Materializes the instance.
    ///
    /// Construction first (registered constructor, else default), then the
    /// assignment pass over every unconsumed directive, then the type's
    /// post-build action if one is registered. All-or-nothing: any failure
    /// drops the partial instance and returns the error.
    pub fn build(mut self) -> Result<T, BuildError> {
        let root = build_shape(&self.registry, T::SHAPE, &mut self.directives)?;
        root.try_materialize()
            .map_err(|value| BuildError::ShapeMismatch {
                key: "<root>".to_string(),
                expected: T::SHAPE,
                actual: value.shape(),
            })
    }

    /// A directive value is acceptable if the destination takes it exactly,
    /// wraps it into an option, or has a conversion registered for the pair.
    fn check_accepts(
        &self,
        leaf: &'static Shape,
        value: &'static Shape,
        key: &str,
    ) -> Result<(), BuildError> {
        if leaf == value {
            return Ok(());
        }
        if let Def::Option(od) = leaf.def {
            if od.t() == value {
                return Ok(());
            }
            if self.registry.conversion(T::SHAPE, value, od.t()).is_some() {
                return Ok(());
            }
        }
        if self.registry.conversion(T::SHAPE, value, leaf).is_some() {
            return Ok(());
        }
        trace!(key, value_shape = %value, leaf = %leaf, "no destination accepts this value");
        Err(BuildError::NoConversionRegistered {
            owner: T::SHAPE,
            source: value,
            dest: leaf,
        })
    }
}

impl<T> core::fmt::Debug for Builder<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Builder")
            .field("directives", &self.directives.len())
            .finish()
    }
}

/// Shape-erased build: construct, assign, post-build.
///
/// Shared by the typed [`Builder::build`] and the factory's erased entry
/// point.
pub(crate) fn build_shape(
    registry: &Registry,
    shape: &'static Shape,
    directives: &mut Vec<Directive>,
) -> Result<OwnedValue, BuildError> {
    debug!(%shape, directives = directives.len(), "building instance");

    let mut root = match registry
        .registration(shape)
        .and_then(|r| r.constructor.as_ref())
    {
        Some(ctor) => {
            let mut raw = RawSources {
                root: shape,
                directives,
                registry,
            };
            ctor(&mut raw)?
        }
        None => OwnedValue::default_of(shape)
            .ok_or(BuildError::MissingDefaultConstructor { shape })?,
    };

    for directive in directives.iter_mut() {
        let Some(value) = directive.value.take() else {
            continue;
        };
        trace!(key = directive.path.key(), "applying directive");
        walk::assign(root.as_ptr_mut(), shape, &directive.path, value, registry)?;
    }

    if let Some(action) = registry
        .registration(shape)
        .and_then(|r| r.post_build.as_ref())
    {
        trace!(%shape, "running post-build action");
        action(root.as_ptr_mut());
    }

    Ok(root)
}

/// Untyped view of a builder's directive store, handed to erased
/// constructors.
pub(crate) struct RawSources<'b> {
    root: &'static Shape,
    directives: &'b mut Vec<Directive>,
    registry: &'b Registry,
}

/// Directive access for registered constructors.
///
/// A constructor for `T` receives `&mut Sources<'_, '_, T>` and can pull
/// directive values out of the builder before the assignment pass runs.
/// Anything it takes is marked consumed and will not be assigned again.
pub struct Sources<'r, 'b, T> {
    raw: &'r mut RawSources<'b>,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, 'b, T: Facet<'static>> Sources<'r, 'b, T> {
    pub(crate) fn new(raw: &'r mut RawSources<'b>) -> Self {
        debug_assert_eq!(raw.root, T::SHAPE);
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Takes the value recorded for `path`, consuming the directive.
    ///
    /// If no directive is present (or it was already consumed), falls back
    /// to `V`'s default construction; fails if `V` has none.
    pub fn take<V: Facet<'static>>(&mut self, path: &str) -> Result<V, BuildError> {
        match self.take_value::<V>(path)? {
            Some(value) => Ok(value),
            None => OwnedValue::default_of(V::SHAPE)
                .ok_or(BuildError::MissingDefaultConstructor { shape: V::SHAPE })?
                .materialize(),
        }
    }

    /// Like [`take`](Self::take), but falls back to `fallback` instead of
    /// `V`'s default when no directive is present.
    pub fn take_or<V: Facet<'static>>(
        &mut self,
        path: &str,
        fallback: V,
    ) -> Result<V, BuildError> {
        Ok(self.take_value::<V>(path)?.unwrap_or(fallback))
    }

    /// Like [`take`](Self::take), but falls back to a full engine build of
    /// `V` — registered constructor, post-build action and all — when no
    /// directive is present.
    pub fn take_or_build<V: Facet<'static>>(&mut self, path: &str) -> Result<V, BuildError> {
        match self.take_value::<V>(path)? {
            Some(value) => Ok(value),
            None => build_shape(self.raw.registry, V::SHAPE, &mut Vec::new())?.materialize(),
        }
    }

    /// Like [`take_or_build`](Self::take_or_build), but the fallback build
    /// goes through a caller-configured builder, so it can carry directives
    /// of its own.
    ///
    /// The fallback builder runs against the same registry as the enclosing
    /// build.
    pub fn take_or_build_with<V, F>(&mut self, path: &str, configure: F) -> Result<V, BuildError>
    where
        V: Facet<'static>,
        F: FnOnce(Builder<V>) -> Result<Builder<V>, BuildError>,
    {
        match self.take_value::<V>(path)? {
            Some(value) => Ok(value),
            None => configure(Builder::new(self.raw.registry.clone()))?.build(),
        }
    }

    fn take_value<V: Facet<'static>>(&mut self, path: &str) -> Result<Option<V>, BuildError> {
        let path = ResolvedPath::resolve(T::SHAPE, path)?;
        let Some(directive) = self.raw.directives.iter_mut().find(|d| d.path == path) else {
            return Ok(None);
        };
        let Some(value) = directive.value.take() else {
            // Already consumed; behaves as absent.
            return Ok(None);
        };
        trace!(key = path.key(), "constructor consumed directive");
        value
            .try_materialize()
            .map(Some)
            .map_err(|value| BuildError::ShapeMismatch {
                key: path.key().to_string(),
                expected: V::SHAPE,
                actual: value.shape(),
            })
    }
}
