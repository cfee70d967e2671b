//! Database catalogs the reconciliation engine reads from and writes to.
//!
//! The [`Catalog`] trait is the capability interface consumed by the engine. [`mongo`]
//! implements it on top of the MongoDB driver and [`memory`] keeps everything in memory,
//! emulating the server rules that matter for index copying.

mod base;
pub mod memory;
pub mod mongo;

pub use base::{Catalog, EndpointRole};
