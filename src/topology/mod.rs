//! Clusterwide document model and its mutation rules.
//!
//! A [`ClusterConfig`] is immutable once committed. Mutations are described by
//! a [`TopologyPatch`], applied to the committed snapshot to build a candidate,
//! and accepted only if [`validate`] finds no violated rule.

mod context;
mod patch;
mod store;
mod types;
mod validate;

pub use context::*;
pub use patch::*;
pub use store::*;
pub use types::*;
pub use validate::*;
