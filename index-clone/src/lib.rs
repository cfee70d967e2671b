//! Copies index definitions between two MongoDB databases.
//!
//! The [`reconcile::ReconciliationEngine`] lists the collections of both databases,
//! processes those present on both in name order and creates every source index the
//! destination is missing. Databases are reached through the [`catalog::Catalog`] trait,
//! implemented by [`catalog::mongo::MongoCatalog`] and by the in-memory
//! [`catalog::memory::MemoryCatalog`] used in tests.

pub mod catalog;
pub mod error;
mod macros;
pub mod observer;
pub mod reconcile;
pub mod types;
