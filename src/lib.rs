//! Clusterwide topology controller.
//!
//! Every node keeps a replicated copy of the cluster document (servers,
//! replicasets, roles, failover, sharding groups, auth) and can coordinate a
//! two-phase change of it. On top of the document sit leader election,
//! role lifecycle with RPC routing, and a session gate for the operator API.
//!
//! Start with [`NodeBuilder`].

mod constants;
mod errors;

pub mod auth;
pub mod config;
pub mod failover;
pub mod membership;
pub mod metrics;
pub mod network;
pub mod node;
pub mod replication;
pub mod roles;
pub mod topology;
pub mod utils;

pub use constants::*;
pub use errors::*;
pub use self::config::*;
pub use self::node::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
