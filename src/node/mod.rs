//! Node assembly: the builder, the running node with its peer handler, the
//! operator API and its HTTP surface.
mod api;
mod builder;
mod http_api;
mod node;
mod views;

pub use api::*;
pub use builder::*;
pub use http_api::*;
pub use node::*;
pub use views::*;
