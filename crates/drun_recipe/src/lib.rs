//! Recipe data model, loader and validation for drun.
//!
//! The [`Loader`] materializes a validated [`Specification`] from a root
//! YAML file plus transitive includes; [`bind_args`] binds command-line
//! tokens to a recipe's declared positionals and flags.

pub mod args;
mod duration;
mod error;
mod loader;
mod recipe;
mod spec;
mod step;
mod validate;

pub use args::{ArgError, BoundArgs, bind_args};
pub use error::ConfigError;
pub use loader::{DEFAULT_CANDIDATES, IncludeFetcher, Loader, NoRemoteIncludes};
pub use recipe::{Flag, FlagType, PositionalArg, Recipe};
pub use spec::{CacheSettings, DEFAULT_TIMEOUT, Defaults, Lifecycle, Specification};
pub use step::Step;
