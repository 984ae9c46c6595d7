//! Roles: named capabilities enabled per replicaset.
//!
//! The [`RoleRegistry`] knows every role this binary can run and keeps the
//! running set in line with the committed topology. The [`RpcRouter`] sends
//! role method calls to whichever node runs the role.

mod builtin;
mod definition;
mod registry;
mod rpc;

pub use builtin::*;
pub use definition::*;
pub use registry::*;
pub use rpc::*;
