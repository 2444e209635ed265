#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

mod builder;
pub use builder::{Builder, Sources};

mod error;
pub use error::{BuildError, PathError, RegistryError};

mod factory;
pub use factory::Factory;

mod path;
pub use path::ResolvedPath;

mod registry;
pub use registry::{FixtureSet, Registry, RegistryBuilder};

mod value;
pub use value::OwnedValue;

mod walk;
