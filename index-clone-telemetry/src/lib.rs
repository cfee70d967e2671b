//! Logging setup shared by the index clone binary and its tests.

pub mod tracing;
