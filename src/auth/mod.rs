//! Session/auth gate of the admin surface.
//!
//! A request is authenticated by an `lsid` session cookie or a Basic
//! `Authorization` header. Enforcement is controlled by the clusterwide
//! `auth` section; when it is off, credentials are still resolved so that
//! the caller's identity is known.

mod credentials;
mod gate;
mod session;

pub use credentials::*;
pub use gate::*;
pub use session::*;
