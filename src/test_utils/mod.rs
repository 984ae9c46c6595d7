//! Shared fixtures for unit tests: role catalogs, ready-made documents, a
//! participant stack over in-memory storage and in-process clusters.
mod cluster;
mod fixtures;
mod harness;

pub use cluster::*;
pub use fixtures::*;
pub use harness::*;
