//! Error types for path resolution, registry population, and building.

use facet_core::Shape;

/// Error returned when a path descriptor cannot be resolved against a root
/// [`Shape`].
///
/// All variants are raised eagerly — at `with()` or retrieval time, never
/// deferred to `build()` — and carry enough context to fix the path without
/// inspecting the engine.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PathError {
    /// The path text is not of the form `ident ('.' ident | '[' index ']')*`.
    Syntax {
        /// The full path as supplied by the caller.
        path: String,
        /// Byte offset of the offending character.
        offset: usize,
        /// What the parser expected at that point.
        expected: &'static str,
    },

    /// A segment names a field the current shape doesn't have.
    UnknownField {
        /// The full path as supplied by the caller.
        path: String,
        /// The field name that failed to resolve.
        segment: String,
        /// The struct shape that was searched.
        shape: &'static Shape,
    },

    /// A field segment was applied to a non-struct shape (scalar, list, map…).
    NotAStruct {
        /// The full path as supplied by the caller.
        path: String,
        /// The field name that couldn't be applied.
        segment: String,
        /// The shape the segment was applied to.
        shape: &'static Shape,
    },

    /// An `[index]` segment was applied to a shape that is not a list or array.
    NotIndexable {
        /// The full path as supplied by the caller.
        path: String,
        /// The index that couldn't be applied.
        index: usize,
        /// The shape the index was applied to.
        shape: &'static Shape,
    },
}

impl core::fmt::Display for PathError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PathError::Syntax {
                path,
                offset,
                expected,
            } => {
                write!(
                    f,
                    "invalid path `{path}`: expected {expected} at offset {offset}; \
                     paths must contain only field accesses and `[n]` indexes"
                )
            }
            PathError::UnknownField {
                path,
                segment,
                shape,
            } => {
                write!(f, "invalid path `{path}`: {shape} has no field `{segment}`")
            }
            PathError::NotAStruct {
                path,
                segment,
                shape,
            } => {
                write!(
                    f,
                    "invalid path `{path}`: cannot access field `{segment}` on {shape}, \
                     which is not a struct"
                )
            }
            PathError::NotIndexable { path, index, shape } => {
                write!(
                    f,
                    "invalid path `{path}`: cannot index [{index}] into {shape}, \
                     which is not a list or array"
                )
            }
        }
    }
}

impl core::error::Error for PathError {}

/// Error raised while populating a [`RegistryBuilder`](crate::RegistryBuilder).
///
/// Every variant is a configuration conflict detected at load time, before any
/// build runs — duplicate registrations are never silently overwritten.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RegistryError {
    /// A constructor function is already registered for this type.
    DuplicateConstructor {
        /// The type that already has a constructor.
        shape: &'static Shape,
    },

    /// A post-build action is already registered for this type.
    DuplicatePostBuild {
        /// The type that already has a post-build action.
        shape: &'static Shape,
    },

    /// A conversion for this (source, destination) pair is already registered
    /// for this type.
    DuplicateConversion {
        /// The type owning the conversion table.
        owner: &'static Shape,
        /// The source shape of the conflicting conversion.
        source: &'static Shape,
        /// The destination shape of the conflicting conversion.
        dest: &'static Shape,
    },
}

impl core::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RegistryError::DuplicateConstructor { shape } => {
                write!(f, "a constructor is already registered for {shape}")
            }
            RegistryError::DuplicatePostBuild { shape } => {
                write!(f, "a post-build action is already registered for {shape}")
            }
            RegistryError::DuplicateConversion {
                owner,
                source,
                dest,
            } => {
                write!(
                    f,
                    "a conversion from {source} to {dest} is already registered for {owner}"
                )
            }
        }
    }
}

impl core::error::Error for RegistryError {}

/// Error raised while recording directives or building an instance.
///
/// Builds are all-or-nothing: if any directive fails during the assignment
/// pass, the partially-built instance is dropped and the build call fails.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BuildError {
    /// The path descriptor could not be resolved.
    Path(PathError),

    /// The same canonical path was set twice on one builder.
    DuplicateDirective {
        /// The canonical path key that was already present.
        key: String,
    },

    /// The target type has no registered constructor and its shape exposes no
    /// default construction.
    MissingDefaultConstructor {
        /// The type that could not be constructed.
        shape: &'static Shape,
    },

    /// An intermediate node along a path needed to be materialized, but its
    /// type exposes no default construction.
    ImplicitInstantiation {
        /// The canonical path key being assigned.
        key: String,
        /// The intermediate type that could not be materialized.
        shape: &'static Shape,
    },

    /// A directive value's shape differs from the destination property's
    /// shape and no conversion is registered for the pair.
    NoConversionRegistered {
        /// The type being built.
        owner: &'static Shape,
        /// The shape of the stored directive value.
        source: &'static Shape,
        /// The declared shape of the destination property.
        dest: &'static Shape,
    },

    /// A value's shape does not match what the destination (or retrieval)
    /// requires.
    ShapeMismatch {
        /// The canonical path key involved.
        key: String,
        /// The shape the destination requires.
        expected: &'static Shape,
        /// The shape that was supplied.
        actual: &'static Shape,
    },

    /// An `[index]` step points past the end of a fixed-size array.
    IndexOutOfBounds {
        /// The canonical path key being assigned.
        key: String,
        /// The array shape.
        shape: &'static Shape,
        /// The requested index.
        index: usize,
        /// The array length.
        len: usize,
    },

    /// An `[index]` step needs a list mutation the list type doesn't support
    /// (growing to reach the index, or mutable element access).
    CannotGrowList {
        /// The canonical path key being assigned.
        key: String,
        /// The list shape.
        shape: &'static Shape,
    },
}

impl From<PathError> for BuildError {
    fn from(err: PathError) -> Self {
        BuildError::Path(err)
    }
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BuildError::Path(err) => err.fmt(f),
            BuildError::DuplicateDirective { key } => {
                write!(f, "path `{key}` was already set on this builder")
            }
            BuildError::MissingDefaultConstructor { shape } => {
                write!(
                    f,
                    "{shape} has no default construction; register a constructor for it \
                     in a FixtureSet and load that set into the registry"
                )
            }
            BuildError::ImplicitInstantiation { key, shape } => {
                write!(
                    f,
                    "cannot materialize intermediate {shape} while assigning `{key}`: \
                     implicitly instantiated nodes must have default construction"
                )
            }
            BuildError::NoConversionRegistered {
                owner,
                source,
                dest,
            } => {
                write!(
                    f,
                    "no conversion from {source} to {dest} is registered for {owner}; \
                     register one in a FixtureSet and load that set into the registry"
                )
            }
            BuildError::ShapeMismatch {
                key,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "value for `{key}` has shape {actual}, but the destination requires {expected}"
                )
            }
            BuildError::IndexOutOfBounds {
                key,
                shape,
                index,
                len,
            } => {
                write!(
                    f,
                    "index [{index}] in `{key}` is out of bounds for {shape} of length {len}"
                )
            }
            BuildError::CannotGrowList { key, shape } => {
                write!(
                    f,
                    "cannot reach the index in `{key}`: {shape} does not \
                     support growing or mutable element access"
                )
            }
        }
    }
}

impl core::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            BuildError::Path(err) => Some(err),
            _ => None,
        }
    }
}
