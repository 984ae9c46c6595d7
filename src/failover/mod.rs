//! Replica-set leadership.
//!
//! Active leaders are a pure function of the committed document and of
//! liveness ([`compute_active_leaders`]); the [`FailoverController`] keeps the
//! result current and publishes it.

mod controller;
mod leaders;

pub use controller::*;
pub use leaders::*;
