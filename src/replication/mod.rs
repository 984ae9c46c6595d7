//! Clusterwide config replication.
//!
//! A mutation is coordinated by the node that received it
//! ([`ConfigReplicator`]) and applied on every reachable node by its
//! [`ConfigApplier`]:
//!
//! 1. prepare: every target validates and persists the candidate as staged
//! 2. commit: all targets staged it, so each one activates it
//! 3. abort: some target failed, the ones that staged it drop it
//!
//! Nodes that were unreachable catch up later through [`ConfigSync`].

mod applier;
mod replicator;
mod storage;
mod sync;

pub use applier::*;
pub use replicator::*;
pub use storage::*;
pub use sync::*;
