//! The entry-point façade: hands out builders bound to one registry.

use facet_core::{Facet, Shape};

use crate::builder::{build_shape, Builder};
use crate::error::BuildError;
use crate::registry::Registry;
use crate::value::OwnedValue;

/// Hands out [`Builder`]s bound to a sealed [`Registry`].
///
/// A factory is cheap to clone and safe to share across threads; every
/// builder it creates consults the same registrations.
#[derive(Clone, Debug)]
pub struct Factory {
    registry: Registry,
}

impl Factory {
    /// Creates a factory over a sealed registry.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Starts a builder for one instance of `T`.
    pub fn create<T: Facet<'static>>(&self) -> Builder<T> {
        Builder::new(self.registry.clone())
    }

    /// Builds an instance of an arbitrary shape with no directives, going
    /// through the full engine (registered constructor, post-build action).
    ///
    /// This is the shape-erased counterpart of
    /// `create::<T>().build()`, for callers that only hold a [`Shape`].
    pub fn build_erased(&self, shape: &'static Shape) -> Result<OwnedValue, BuildError> {
        build_shape(&self.registry, shape, &mut Vec::new())
    }

    /// The registry this factory consults.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl From<Registry> for Factory {
    fn from(registry: Registry) -> Self {
        Self::new(registry)
    }
}
