mod routes;
mod transport;

pub use routes::*;
pub use transport::*;
