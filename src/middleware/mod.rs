pub mod auth;
pub mod connection_limit;

pub use auth::{auth_middleware, stream_auth_middleware};
pub use connection_limit::{ConnectionSlot, connection_limit_middleware};
