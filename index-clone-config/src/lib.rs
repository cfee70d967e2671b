//! Configuration types and loading for the index clone tool.
//!
//! Provides the [`shared::CloneConfig`] structure consumed by the reconciliation engine,
//! the layered [`load_config`] loader and the runtime [`Environment`] selector.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{ConfigOverrides, LoadConfigError, load_config};
